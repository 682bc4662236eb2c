use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use page_sync::context::assembler::assemble;
use page_sync::context::commands::CustomCommand;
use page_sync::context::context_model::SharedPageState;
use page_sync::dispatch::command_model::{AgentCommand, FieldUpdate, NavigationAction};
use page_sync::dispatch::dispatcher::{
    DispatchConfig, Dispatcher, InputHandler, LegacyCustomHandler, NavigationHandler,
    UPDATED_ATTRIBUTE, attach,
};
use page_sync::dom::document::{Document, DomEvent, EventListener, WeakElement};
use page_sync::sync::transport::{AgentTransport, COMMAND_EVENT, RecordingTransport};

mod common;
use crate::common::{CHECKOUT_URI, checkout_page, recording_command};

// ============================================================================
// Helpers
// ============================================================================

/// State as the scheduler would have published it for `document`.
fn published_state(document: &Document, commands: &[CustomCommand]) -> SharedPageState {
    let shared = SharedPageState::new();
    shared.replace(Arc::new(assemble(document, commands, None).state));
    shared
}

fn dispatcher(document: &Document, config: DispatchConfig) -> Dispatcher {
    Dispatcher::new(document.clone(), config, published_state(document, &[]))
}

fn input_event(fields: Value) -> Value {
    json!({"classification": "input", "fields": fields})
}

fn navigation_event(action: &str, destination: Option<&str>) -> Value {
    match destination {
        Some(d) => json!({"classification": "navigation", "action": action, "destination": d}),
        None => json!({"classification": "navigation", "action": action}),
    }
}

// ============================================================================
// Input
// ============================================================================

#[tokio::test(start_paused = true)]
async fn input_round_trip_through_the_transport() {
    let doc = checkout_page();
    let transport = Arc::new(RecordingTransport::new());
    let agent_side: Arc<dyn AgentTransport> = transport.clone();
    let _detach = attach(
        doc.clone(),
        agent_side,
        DispatchConfig::default(),
        published_state(&doc, &[]),
    );

    let ran = transport.emit(
        COMMAND_EVENT,
        &input_event(json!([{"id": "input-0", "value": "c@d.com"}])),
    );
    assert_eq!(ran, 1);

    let email = doc.element_by_id("email").unwrap();
    assert_eq!(email.value(), "c@d.com");
    assert_eq!(email.dispatched_events(), vec!["input", "change"]);
    assert!(email.has_attribute(UPDATED_ATTRIBUTE));

    tokio::time::sleep(Duration::from_millis(1990)).await;
    assert!(email.has_attribute(UPDATED_ATTRIBUTE));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!email.has_attribute(UPDATED_ATTRIBUTE));
}

#[tokio::test(start_paused = true)]
async fn newer_write_keeps_the_highlight() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());
    let email = doc.element_by_id("email").unwrap();

    d.handle_event(&input_event(json!([{"id": "input-0", "value": "one"}])));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    d.handle_event(&input_event(json!([{"id": "input-0", "value": "two"}])));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(email.has_attribute(UPDATED_ATTRIBUTE), "first timer must not clear the second mark");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!email.has_attribute(UPDATED_ATTRIBUTE));
}

#[tokio::test(start_paused = true)]
async fn dispatchers_sharing_a_page_keep_each_others_highlight() {
    let doc = checkout_page();
    let first = dispatcher(&doc, DispatchConfig::default());
    let second = dispatcher(&doc, DispatchConfig::default());
    let email = doc.element_by_id("email").unwrap();

    first.handle_event(&input_event(json!([{"id": "input-0", "value": "one"}])));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    second.handle_event(&input_event(json!([{"id": "input-0", "value": "two"}])));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(email.has_attribute(UPDATED_ATTRIBUTE));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!email.has_attribute(UPDATED_ATTRIBUTE));
}

#[test]
fn page_listeners_see_agent_writes() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());
    let email = doc.element_by_id("email").unwrap();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: EventListener = Arc::new(move |event: &DomEvent| {
        sink.lock().push(event.kind.clone());
    });
    email.add_event_listener("change", listener);

    d.handle_event(&input_event(json!([{"id": "input-0", "value": "c@d.com"}])));

    assert_eq!(*seen.lock(), vec!["change".to_string()]);
}

#[test]
fn checkbox_accepts_bool_and_string_flags() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());
    let gift = doc.element_by_id("gift").unwrap();

    d.handle_event(&input_event(json!([{"id": "input-1", "value": true}])));
    assert!(gift.checked());

    d.handle_event(&input_event(json!([{"id": "input-1", "value": "false"}])));
    assert!(!gift.checked());

    d.handle_event(&input_event(json!([{"id": "input-1", "value": "TRUE"}])));
    assert!(gift.checked());
    assert_eq!(gift.dispatched_events().len(), 6);
}

#[test]
fn select_picks_matching_option() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());
    let size = doc.element_by_id("size").unwrap();

    d.handle_event(&input_event(json!([{"id": "select-2", "value": "s"}])));
    assert_eq!(size.value(), "s");

    d.handle_event(&input_event(json!([{"id": "select-2", "value": "xl"}])));
    assert_eq!(size.value(), "s", "no match falls back to the first option");
}

#[test]
fn unknown_and_removed_fields_are_skipped() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());
    let gift = doc.element_by_id("gift").unwrap();
    doc.remove(&gift);

    d.handle(AgentCommand::Input {
        fields: vec![
            FieldUpdate::new("input-99", "x"),
            FieldUpdate::new("input-1", true),
            FieldUpdate::new("input-0", "still applied"),
        ],
    });

    assert!(!gift.checked());
    assert!(gift.dispatched_events().is_empty());
    assert_eq!(doc.element_by_id("email").unwrap().value(), "still applied");
}

#[test]
fn input_override_replaces_default_handling() {
    let doc = checkout_page();
    let seen: Arc<Mutex<Vec<(Vec<FieldUpdate>, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: InputHandler = Arc::new(
        move |fields: &[FieldUpdate], elements: &HashMap<String, WeakElement>| {
            sink.lock().push((fields.to_vec(), elements.len()));
        },
    );
    let d = dispatcher(
        &doc,
        DispatchConfig {
            input: Some(handler),
            ..Default::default()
        },
    );

    d.handle_event(&input_event(json!([{"id": "input-0", "value": "c@d.com"}])));

    assert_eq!(doc.element_by_id("email").unwrap().value(), "a@b.com");
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, vec![FieldUpdate::new("input-0", "c@d.com")]);
    assert_eq!(seen[0].1, 3);
}

#[test]
fn automatic_context_off_without_override_does_nothing() {
    let doc = checkout_page();
    let d = dispatcher(
        &doc,
        DispatchConfig {
            automatic_context: false,
            ..Default::default()
        },
    );

    d.handle_event(&input_event(json!([{"id": "input-0", "value": "c@d.com"}])));
    d.handle_event(&navigation_event("page_custom", Some("Cart")));

    assert_eq!(doc.element_by_id("email").unwrap().value(), "a@b.com");
    assert_eq!(doc.uri(), CHECKOUT_URI);
}

// ============================================================================
// Navigation
// ============================================================================

#[test]
fn custom_navigation_follows_page_links() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());

    d.handle_event(&navigation_event("page_custom", Some("Cart")));
    assert_eq!(doc.uri(), "https://shop.test/cart");
}

#[test]
fn custom_navigation_accepts_literal_urls_only() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());

    d.handle_event(&navigation_event("page_custom", Some("not a url")));
    assert_eq!(doc.uri(), CHECKOUT_URI);

    d.handle_event(&navigation_event("page_custom", None));
    assert_eq!(doc.uri(), CHECKOUT_URI);

    d.handle_event(&navigation_event("page_custom", Some("https://example.com")));
    assert_eq!(doc.uri(), "https://example.com");
}

#[test]
fn previous_and_next_walk_history() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());

    d.handle_event(&navigation_event("page_previous", None));
    assert_eq!(doc.uri(), CHECKOUT_URI, "no earlier entry");

    d.handle_event(&navigation_event("page_custom", Some("Help")));
    d.handle_event(&navigation_event("page_previous", None));
    assert_eq!(doc.uri(), CHECKOUT_URI);

    d.handle_event(&navigation_event("page_next", None));
    assert_eq!(doc.uri(), "https://help.test/");
}

#[test]
fn unknown_navigation_action_is_ignored() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());

    let command: AgentCommand =
        serde_json::from_value(navigation_event("page_sideways", Some("Cart"))).unwrap();
    assert_eq!(
        command,
        AgentCommand::Navigation {
            action: NavigationAction::PageUnknown,
            destination: Some("Cart".into()),
        }
    );

    d.handle(command);
    assert_eq!(doc.uri(), CHECKOUT_URI);
}

#[test]
fn navigation_override_receives_links() {
    let doc = checkout_page();
    type Seen = (NavigationAction, Option<String>, Vec<String>);
    let seen: Arc<Mutex<Vec<Seen>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: NavigationHandler = Arc::new(
        move |action: NavigationAction,
              destination: Option<&str>,
              links: &BTreeMap<String, String>| {
            sink.lock().push((
                action,
                destination.map(str::to_string),
                links.keys().cloned().collect(),
            ));
        },
    );
    let d = dispatcher(
        &doc,
        DispatchConfig {
            navigation: Some(handler),
            automatic_context: false,
            ..Default::default()
        },
    );

    d.handle_event(&navigation_event("page_custom", Some("Help")));

    assert_eq!(doc.uri(), CHECKOUT_URI);
    assert_eq!(
        *seen.lock(),
        vec![(
            NavigationAction::PageCustom,
            Some("Help".to_string()),
            vec!["Cart".to_string(), "Help".to_string()],
        )]
    );
}

// ============================================================================
// Custom commands
// ============================================================================

#[test]
fn custom_command_reaches_registered_and_legacy_handlers() {
    let doc = checkout_page();
    let (command, calls) = recording_command("apply_coupon");
    let legacy_calls: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&legacy_calls);
    let legacy: LegacyCustomHandler = Arc::new(move |action: &str, payload: &Value| {
        sink.lock().push((action.to_string(), payload.clone()));
    });
    let d = Dispatcher::new(
        doc.clone(),
        DispatchConfig {
            custom: Some(legacy),
            ..Default::default()
        },
        published_state(&doc, &[command]),
    );

    d.handle_event(&json!({
        "classification": "custom",
        "action": "apply_coupon",
        "payload": {"code": "SAVE10"}
    }));

    assert_eq!(*calls.lock(), vec![json!({"code": "SAVE10"})]);
    assert_eq!(
        *legacy_calls.lock(),
        vec![("apply_coupon".to_string(), json!({"code": "SAVE10"}))]
    );
}

#[test]
fn unregistered_custom_action_is_a_no_op() {
    let doc = checkout_page();
    let (command, calls) = recording_command("apply_coupon");
    let d = Dispatcher::new(
        doc.clone(),
        DispatchConfig::default(),
        published_state(&doc, &[command]),
    );

    d.handle_event(&json!({"classification": "custom", "action": "other"}));
    assert!(calls.lock().is_empty());
}

#[test]
fn custom_command_payload_is_validated() {
    let doc = checkout_page();
    let (command, calls) = recording_command("pick");
    let command = command.with_schema(json!({"enum": ["a", "b"]}));
    let d = Dispatcher::new(
        doc.clone(),
        DispatchConfig::default(),
        published_state(&doc, &[command]),
    );

    d.handle_event(&json!({"classification": "custom", "action": "pick", "payload": "z"}));
    d.handle_event(&json!({"classification": "custom", "action": "pick", "payload": "b"}));

    assert_eq!(*calls.lock(), vec![json!("b")]);
}

#[test]
fn panicking_handlers_do_not_unwind_into_the_transport() {
    let doc = checkout_page();
    let transport = Arc::new(RecordingTransport::new());
    let agent_side: Arc<dyn AgentTransport> = transport.clone();
    let exploding = CustomCommand::new("explode", |_| panic!("handler failed"));
    let legacy_calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&legacy_calls);
    let legacy: LegacyCustomHandler = Arc::new(move |action: &str, _: &Value| {
        sink.lock().push(action.to_string());
    });
    let input: InputHandler = Arc::new(|_: &[FieldUpdate], _: &HashMap<String, WeakElement>| {
        panic!("input override failed")
    });
    let _detach = attach(
        doc.clone(),
        agent_side,
        DispatchConfig {
            custom: Some(legacy),
            input: Some(input),
            ..Default::default()
        },
        published_state(&doc, &[exploding]),
    );

    let custom = json!({"classification": "custom", "action": "explode"});
    assert_eq!(transport.emit(COMMAND_EVENT, &custom), 1);
    assert_eq!(*legacy_calls.lock(), vec!["explode".to_string()]);

    let input = input_event(json!([{"id": "input-0", "value": "c@d.com"}]));
    assert_eq!(transport.emit(COMMAND_EVENT, &input), 1);

    // later events are still handled
    transport.emit(COMMAND_EVENT, &navigation_event("page_custom", Some("Cart")));
    assert_eq!(doc.uri(), "https://shop.test/cart");
}

// ============================================================================
// Subscription and state
// ============================================================================

#[test]
fn malformed_events_are_ignored() {
    let doc = checkout_page();
    let d = dispatcher(&doc, DispatchConfig::default());

    d.handle_event(&json!({"classification": "teleport"}));
    d.handle_event(&json!({"classification": "input"}));
    d.handle_event(&json!("input"));

    assert_eq!(doc.element_by_id("email").unwrap().value(), "a@b.com");
}

#[test]
fn detach_unsubscribes() {
    let doc = checkout_page();
    let transport = Arc::new(RecordingTransport::new());
    let agent_side: Arc<dyn AgentTransport> = transport.clone();
    let detach = attach(
        doc.clone(),
        agent_side,
        DispatchConfig::default(),
        SharedPageState::new(),
    );
    assert_eq!(transport.listener_count(COMMAND_EVENT), 1);

    detach.detach();
    assert_eq!(transport.listener_count(COMMAND_EVENT), 0);
    assert_eq!(
        transport.emit(COMMAND_EVENT, &navigation_event("page_custom", Some("Cart"))),
        0
    );
}

#[test]
fn dispatcher_reads_the_latest_published_state() {
    let doc = checkout_page();
    let shared = SharedPageState::new();
    let d = Dispatcher::new(doc.clone(), DispatchConfig::default(), shared.clone());

    d.handle_event(&input_event(json!([{"id": "input-0", "value": "early"}])));
    assert_eq!(doc.element_by_id("email").unwrap().value(), "a@b.com");

    shared.replace(Arc::new(assemble(&doc, &[], None).state));
    d.handle_event(&input_event(json!([{"id": "input-0", "value": "late"}])));
    assert_eq!(doc.element_by_id("email").unwrap().value(), "late");
}
