//! Publish widget: state machine, configuration and the rendering seam.

mod state;
mod view;
mod controller;

pub use state::{ColumnChoice, ElementIds, WidgetConfig, WidgetState, DEFAULT_INDEX_TYPES};
pub use view::{RecordingView, WidgetView};
pub use controller::WidgetController;
