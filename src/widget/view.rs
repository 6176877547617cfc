use std::collections::HashMap;

use parking_lot::RwLock;

use super::state::ColumnChoice;

/// Rendering surface driven by the controller, addressed by element id.
pub trait WidgetView: Send + Sync {
    fn set_visible(&self, element_id: &str, visible: bool);
    fn set_enabled(&self, element_id: &str, enabled: bool);
    fn set_options(&self, element_id: &str, options: &[ColumnChoice]);
    fn set_text(&self, element_id: &str, text: &str);
}

/// Keeps the last value written to each element; handy for headless runs.
#[derive(Default)]
pub struct RecordingView {
    visible: RwLock<HashMap<String, bool>>,
    enabled: RwLock<HashMap<String, bool>>,
    options: RwLock<HashMap<String, Vec<ColumnChoice>>>,
    text: RwLock<HashMap<String, String>>,
}

impl RecordingView {
    pub fn new() -> Self { Self::default() }

    pub fn is_visible(&self, element_id: &str) -> bool {
        self.visible.read().get(element_id).copied().unwrap_or(false)
    }

    pub fn is_enabled(&self, element_id: &str) -> bool {
        self.enabled.read().get(element_id).copied().unwrap_or(false)
    }

    pub fn options(&self, element_id: &str) -> Vec<ColumnChoice> {
        self.options.read().get(element_id).cloned().unwrap_or_default()
    }

    pub fn text(&self, element_id: &str) -> Option<String> {
        self.text.read().get(element_id).cloned()
    }
}

impl WidgetView for RecordingView {
    fn set_visible(&self, element_id: &str, visible: bool) {
        self.visible.write().insert(element_id.to_string(), visible);
    }

    fn set_enabled(&self, element_id: &str, enabled: bool) {
        self.enabled.write().insert(element_id.to_string(), enabled);
    }

    fn set_options(&self, element_id: &str, options: &[ColumnChoice]) {
        self.options.write().insert(element_id.to_string(), options.to_vec());
    }

    fn set_text(&self, element_id: &str, text: &str) {
        self.text.write().insert(element_id.to_string(), text.to_string());
    }
}
