use crate::dom::accessibility::{accessible_description, accessible_name, collapse_whitespace};
use crate::dom::document::{Element, ElementHandle};
use crate::error::SyncError;
use crate::screen::screen_model::{ControlKind, FieldOption, FieldValue, InteractiveElementDescriptor};

pub fn control_kind(element: &Element) -> Result<ControlKind, SyncError> {
    match element.tag() {
        "input" if element.input_type() == "checkbox" => Ok(ControlKind::Checkbox),
        "input" | "textarea" => Ok(ControlKind::TextLike),
        "select" => Ok(ControlKind::Select),
        "a" => Ok(ControlKind::Link),
        other => Err(SyncError::UnsupportedElement {
            tag: other.to_string(),
        }),
    }
}

/// Describe one interactive element from its current state.
///
/// `page` is the document snapshot used to resolve label references.
/// Unsupported tags fail this call only.
pub fn describe(
    id: &str,
    element: &Element,
    page: &[ElementHandle],
) -> Result<InteractiveElementDescriptor, SyncError> {
    let kind = control_kind(element)?;

    let mut name = accessible_name(element, page);
    if name.is_empty() {
        name = element
            .attribute("name")
            .map(|n| collapse_whitespace(&n))
            .unwrap_or_default();
    }

    let (r#type, value, options) = match kind {
        ControlKind::TextLike => {
            let r#type = if element.tag() == "textarea" {
                "textarea".to_string()
            } else {
                element.input_type()
            };
            (r#type, FieldValue::Text(element.value()), None)
        }
        ControlKind::Checkbox => {
            let checked = element.checked();
            let options = vec![
                FieldOption {
                    value: FieldValue::Flag(true),
                    text: "checked".into(),
                    selected: checked,
                },
                FieldOption {
                    value: FieldValue::Flag(false),
                    text: "unchecked".into(),
                    selected: !checked,
                },
            ];
            ("checkbox".to_string(), FieldValue::Flag(checked), Some(options))
        }
        ControlKind::Select => {
            let r#type = if element.has_attribute("multiple") {
                "select-multiple"
            } else {
                "select-one"
            };
            let options = element
                .options()
                .into_iter()
                .map(|o| FieldOption {
                    value: FieldValue::Text(o.value),
                    text: collapse_whitespace(&o.text),
                    selected: o.selected,
                })
                .collect();
            (r#type.to_string(), FieldValue::Text(element.value()), Some(options))
        }
        ControlKind::Link => (
            "link".to_string(),
            FieldValue::Text(element.resolved_href().unwrap_or_default()),
            None,
        ),
    };

    Ok(InteractiveElementDescriptor {
        id: id.to_string(),
        name,
        description: accessible_description(element, page),
        r#type,
        value,
        options,
    })
}
