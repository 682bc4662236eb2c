#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use page_sync::{CustomCommand, Document, ElementSpec};

pub const CHECKOUT_URI: &str = "https://shop.test/checkout";

/// Email text field, gift-wrap checkbox, size select and two links.
///
/// Field ids: `input-0` (email), `input-1` (gift wrap), `select-2` (size).
pub fn checkout_page() -> Document {
    Document::from_specs(
        CHECKOUT_URI,
        [
            ElementSpec::new("label").attr("for", "email").text("Email"),
            ElementSpec::new("input")
                .attr("id", "email")
                .attr("type", "text")
                .value("a@b.com"),
            ElementSpec::new("input")
                .attr("id", "gift")
                .attr("type", "checkbox")
                .attr("aria-label", "Gift wrap"),
            ElementSpec::new("select")
                .attr("id", "size")
                .attr("name", "size")
                .option("s", "Small", false)
                .option("l", "Large", true),
            ElementSpec::new("a").attr("href", "/cart").text("Cart"),
            ElementSpec::new("a").attr("href", "https://help.test/").text("Help"),
            ElementSpec::new("div").attr("id", "banner").text("Free shipping"),
        ],
    )
}

pub type Invocations = Arc<Mutex<Vec<Value>>>;

/// Command whose handler records every payload it receives.
pub fn recording_command(action: &str) -> (CustomCommand, Invocations) {
    let calls: Invocations = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let command = CustomCommand::new(action, move |payload| sink.lock().push(payload));
    (command, calls)
}
