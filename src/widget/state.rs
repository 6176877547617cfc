use serde::{Deserialize, Serialize};

use crate::grist::AccessLevel;

/// Column types accepted as the index column unless configured otherwise.
pub const DEFAULT_INDEX_TYPES: &[&str] = &["Numeric", "Text", "Int"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetState {
    Loading,
    Form,
    Submitting,
    Success(String),
    Error(String),
}

impl WidgetState {
    pub fn name(&self) -> &'static str {
        match self {
            WidgetState::Loading => "loading",
            WidgetState::Form => "form",
            WidgetState::Submitting => "submitting",
            WidgetState::Success(_) => "success",
            WidgetState::Error(_) => "error",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, WidgetState::Loading | WidgetState::Submitting)
    }
}

/// Element identifiers the controller drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementIds {
    pub form: String,
    pub column_select: String,
    pub submit: String,
    pub link: String,
    pub loading: String,
    pub success: String,
    pub error: String,
    pub result: String,
}

impl Default for ElementIds {
    fn default() -> Self {
        Self {
            form: "supersetForm".into(),
            column_select: "indexColumn".into(),
            submit: "submitBtn".into(),
            link: "linkBtn".into(),
            loading: "loadingBloc".into(),
            success: "successBloc".into(),
            error: "errorBloc".into(),
            result: "resultArea".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    pub allowed_index_types: Vec<String>,
    pub access: AccessLevel,
    pub elements: ElementIds,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            allowed_index_types: DEFAULT_INDEX_TYPES.iter().map(|s| s.to_string()).collect(),
            access: AccessLevel::Full,
            elements: ElementIds::default(),
        }
    }
}

impl WidgetConfig {
    pub fn with_index_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_index_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows(&self, base_type: &str) -> bool {
        self.allowed_index_types.iter().any(|t| t == base_type)
    }
}

/// An entry of the index column selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnChoice {
    pub id: String,
    pub label: String,
    pub col_type: String,
}
