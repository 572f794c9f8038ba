use std::fmt;

use serde::{Deserialize, Serialize};

/// Adapter-scoped identifier of a control on the current step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub String);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldId {
    fn from(id: &str) -> Self {
        FieldId(id.to_string())
    }
}

/// The raw control as the site renders it, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlType {
    TextInput {
        #[serde(default)]
        autocomplete: bool,
    },
    TextArea,
    Select,
    RadioGroup,
    CheckboxGroup,
}

/// One labelled control on a wizard step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: FieldId,
    pub label: String,
    pub control: ControlType,
    /// Current value: typed text, selected option, or checked label.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

/// The control that leaves the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepControl {
    Next,
    Review,
    Submit,
}

impl StepControl {
    pub fn is_submit(&self) -> bool {
        matches!(self, StepControl::Submit)
    }
}

/// Snapshot of one wizard page, re-acquired before every interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormStep {
    #[serde(default)]
    pub title: Option<String>,
    pub fields: Vec<FormField>,
    pub control: StepControl,
}

/// What the adapter currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum StepState {
    Step(FormStep),
    /// The wizard is gone (dismissed, already applied, or finished).
    Closed,
}
