use crate::dom::document::{Element, ElementHandle};

/// Simplified accessible name computation.
///
/// Sources, first non-empty wins: `aria-labelledby`, `aria-label`,
/// `<label for=…>`, text content (links only), `title`, `placeholder`.
pub fn accessible_name(element: &Element, page: &[ElementHandle]) -> String {
    name_source(element, page)
        .map(|(name, _)| name)
        .unwrap_or_default()
}

/// `aria-describedby` texts, else a `title` that was not used as the name.
pub fn accessible_description(element: &Element, page: &[ElementHandle]) -> Option<String> {
    if let Some(ids) = element.attribute("aria-describedby") {
        let described = referenced_text(&ids, page);
        if !described.is_empty() {
            return Some(described);
        }
    }

    let title_is_name = matches!(name_source(element, page), Some((_, NameSource::Title)));
    if title_is_name {
        return None;
    }

    element
        .attribute("title")
        .map(|t| collapse_whitespace(&t))
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameSource {
    LabelledBy,
    AriaLabel,
    Label,
    Content,
    Title,
    Placeholder,
}

fn name_source(element: &Element, page: &[ElementHandle]) -> Option<(String, NameSource)> {
    if let Some(ids) = element.attribute("aria-labelledby") {
        let name = referenced_text(&ids, page);
        if !name.is_empty() {
            return Some((name, NameSource::LabelledBy));
        }
    }

    if let Some(label) = non_empty(element.attribute("aria-label")) {
        return Some((label, NameSource::AriaLabel));
    }

    if let Some(id) = element.attribute("id") {
        let label = page
            .iter()
            .filter(|node| node.tag() == "label" && node.attribute("for").as_deref() == Some(id.as_str()))
            .map(|node| collapse_whitespace(&node.text()))
            .find(|text| !text.is_empty());
        if let Some(label) = label {
            return Some((label, NameSource::Label));
        }
    }

    if element.tag() == "a" {
        if let Some(content) = non_empty(Some(element.text())) {
            return Some((content, NameSource::Content));
        }
    }

    if let Some(title) = non_empty(element.attribute("title")) {
        return Some((title, NameSource::Title));
    }

    non_empty(element.attribute("placeholder")).map(|p| (p, NameSource::Placeholder))
}

fn referenced_text(ids: &str, page: &[ElementHandle]) -> String {
    let parts: Vec<String> = ids
        .split_whitespace()
        .filter_map(|id| {
            page.iter()
                .find(|node| node.attribute("id").as_deref() == Some(id))
        })
        .map(|node| collapse_whitespace(&node.text()))
        .filter(|text| !text.is_empty())
        .collect();
    parts.join(" ")
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| collapse_whitespace(&s)).filter(|s| !s.is_empty())
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
