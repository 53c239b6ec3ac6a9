//! Deep text substitution over interaction fields

use std::collections::BTreeMap;

/// Replace every occurrence of `text` with `replacement` in all string data
///
/// Implemented for the field types making up an interaction, so a walk
/// over a request or response reaches header names, header values, bodies
/// and nested collections without inspecting types at runtime.
pub trait FilterText {
    /// Substitute in place
    fn filter_text(&mut self, text: &str, replacement: &str);
}

impl FilterText for String {
    fn filter_text(&mut self, text: &str, replacement: &str) {
        if self.contains(text) {
            *self = self.replace(text, replacement);
        }
    }
}

impl<T: FilterText> FilterText for Option<T> {
    fn filter_text(&mut self, text: &str, replacement: &str) {
        if let Some(value) = self {
            value.filter_text(text, replacement);
        }
    }
}

impl<T: FilterText> FilterText for Vec<T> {
    fn filter_text(&mut self, text: &str, replacement: &str) {
        for item in self.iter_mut() {
            item.filter_text(text, replacement);
        }
    }
}

impl<V: FilterText> FilterText for BTreeMap<String, V> {
    fn filter_text(&mut self, text: &str, replacement: &str) {
        let entries = std::mem::take(self);
        for (mut key, mut value) in entries {
            value.filter_text(text, replacement);
            key.filter_text(text, replacement);
            self.insert(key, value);
        }
    }
}
