use parking_lot::Mutex;

use crate::widget::{ColumnChoice, ElementIds, WidgetView};

/// Renders widget updates as status lines on stderr.
pub struct TerminalView {
    ids: ElementIds,
    last_busy: Mutex<bool>,
}

impl TerminalView {
    pub fn new(ids: ElementIds) -> Self {
        Self { ids, last_busy: Mutex::new(false) }
    }
}

impl WidgetView for TerminalView {
    fn set_visible(&self, element_id: &str, visible: bool) {
        if element_id != self.ids.loading { return; }
        let mut last = self.last_busy.lock();
        if visible && !*last {
            eprintln!("working...");
        }
        *last = visible;
    }

    fn set_enabled(&self, _element_id: &str, _enabled: bool) {}

    fn set_options(&self, element_id: &str, options: &[ColumnChoice]) {
        if element_id != self.ids.column_select { return; }
        if options.is_empty() { return; }
        eprintln!("eligible index columns:");
        for c in options {
            eprintln!("  {} ({}, {})", c.id, c.label, c.col_type);
        }
    }

    fn set_text(&self, element_id: &str, text: &str) {
        if element_id == self.ids.success {
            eprintln!("success: {}", text);
        } else if element_id == self.ids.error {
            eprintln!("error: {}", text);
        } else {
            eprintln!("{}", text);
        }
    }
}
