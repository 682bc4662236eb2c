use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::dom::accessibility::accessible_name;
use crate::dom::document::{Document, WeakElement};
use crate::screen::inspector::describe;
use crate::screen::screen_model::InteractiveElementDescriptor;

pub const FIELD_TAGS: [&str; 3] = ["input", "textarea", "select"];

#[derive(Debug, Default)]
pub struct Survey {
    pub fields: Vec<InteractiveElementDescriptor>,
    pub form_elements: HashMap<String, WeakElement>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkSurvey {
    /// Unique names in first-seen order
    pub destination_names: Vec<String>,
    pub links: BTreeMap<String, String>,
}

/// Describe every form control in document order.
///
/// Ids are `<tag>-<ordinal>` where the ordinal is the position in the
/// control query, so they only hold until the next survey.
pub fn survey(document: &Document) -> Survey {
    let page = document.elements();
    let controls = document.query(&FIELD_TAGS);
    let mut result = Survey::default();

    for (ordinal, element) in controls.iter().enumerate() {
        let id = format!("{}-{}", element.tag(), ordinal);
        match describe(&id, element, &page) {
            Ok(descriptor) => {
                result.form_elements.insert(id, Arc::downgrade(element));
                result.fields.push(descriptor);
            }
            Err(e) => debug!(id = %id, error = %e, "skipping element during survey"),
        }
    }

    result
}

/// Map link names to absolute hrefs. The first href seen for a name wins;
/// later links with the same name are dropped.
pub fn survey_links(document: &Document) -> LinkSurvey {
    let page = document.elements();
    let mut result = LinkSurvey::default();

    for anchor in document.query(&["a"]) {
        let Some(href) = anchor.resolved_href() else {
            continue;
        };
        let name = accessible_name(&anchor, &page);
        if result.links.contains_key(&name) {
            continue;
        }
        result.destination_names.push(name.clone());
        result.links.insert(name, href);
    }

    result
}
