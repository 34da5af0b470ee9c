//! Row model for the state-sheet DSL.
//!
//! A sheet is read into [`RawRow`]s (strings as they appear in the file), and
//! phase 1 turns each meaningful one into a typed [`Row`].

use serde::{Deserialize, Serialize};

/// Source position of one row, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLocation {
    /// 1-based line number in the input document.
    pub line: usize,
    /// The raw line text.
    pub text: String,
}

/// One record of the sheet, untyped.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub loc: RowLocation,
    pub input_type: String,
    pub input_detail: String,
    pub choice_share: String,
    pub result_duration: String,
    pub result_type: String,
    pub result_detail: String,
    /// Cells of the unnamed trailing columns, in column order.
    pub extra: Vec<String>,
}

/// What can trigger a choice set inside a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputKind {
    Enter,
    UserIn,
    Net,
    Timer,
    TimerR,
    /// Continues the current action series rather than triggering anything.
    Contd,
}

impl InputKind {
    pub const ALL: [InputKind; 6] = [
        InputKind::Enter,
        InputKind::UserIn,
        InputKind::Net,
        InputKind::Timer,
        InputKind::TimerR,
        InputKind::Contd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InputKind::Enter => "ENTER",
            InputKind::UserIn => "USER_IN",
            InputKind::Net => "NET",
            InputKind::Timer => "TIMER",
            InputKind::TimerR => "TIMER_R",
            InputKind::Contd => "CONTD",
        }
    }
}

/// Result kinds a sheet author may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    Text,
    SetAnimTemp,
    SetAnimBg,
    StateTransition,
    Push,
    Pop,
    Previous,
    Close,
    Other,
}

impl ResultKind {
    /// Results after which the current state is left, so no CONTD may follow.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResultKind::StateTransition | ResultKind::Push | ResultKind::Pop | ResultKind::Previous
        )
    }
}

/// The (input kind, input detail) pair that identifies a choice set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputTuple {
    pub kind: InputKind,
    pub detail: String,
}

impl InputTuple {
    pub fn new(kind: InputKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn enter() -> Self {
        Self::new(InputKind::Enter, "")
    }
}

impl std::fmt::Display for InputTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.kind.name())
        } else {
            write!(f, "{}({})", self.kind.name(), self.detail)
        }
    }
}

/// An event row after phase-1 validation.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub input: InputKind,
    pub input_detail: String,
    pub choice_share: u16,
    /// Seconds; `None` when the cell was blank.
    pub duration: Option<f64>,
    pub result: ResultKind,
    pub result_detail: String,
    /// Non-empty alternative text cells.
    pub extra_choices: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Record {
    /// `START_STATE,<name>`; the name is already uppercased.
    StateDecl { name: String },
    Event(EventRow),
}

/// A meaningful, validated row.
#[derive(Debug, Clone)]
pub struct Row {
    pub loc: RowLocation,
    pub record: Record,
}
