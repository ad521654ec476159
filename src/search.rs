//! In-memory search over populated components.

use crate::models::ComponentView;

/// Keep the components whose searchable text contains every term of `query`.
///
/// Terms are split on whitespace and matched case-insensitively as
/// substrings. Order is preserved; an empty query keeps everything.
pub fn filter(components: Vec<ComponentView>, query: &str) -> Vec<ComponentView> {
    let terms = terms(query);
    if terms.is_empty() {
        return components;
    }

    components
        .into_iter()
        .filter(|component| {
            let haystack = searchable_text(component);
            terms.iter().all(|term| haystack.contains(term.as_str()))
        })
        .collect()
}

fn terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|term| term.to_lowercase())
        .collect()
}

/// `name type (desc.name desc.text)* child.name*`, lowercased.
fn searchable_text(component: &ComponentView) -> String {
    let mut parts = vec![component.name.as_str(), component.kind.as_str()];
    for description in &component.descriptions {
        parts.push(description.name.as_str());
        parts.push(description.text.as_str());
    }
    for child in &component.components {
        parts.push(child.name.as_str());
    }
    parts.join(" ").to_lowercase()
}
