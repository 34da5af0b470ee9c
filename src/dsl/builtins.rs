use super::graph::ActionType;

/// Visible characters per display frame.
pub const FRAME_WIDTH: usize = 24;
/// Bytes per text-pool slot: frame content plus terminator.
pub const TEXT_SLOT_SIZE: usize = FRAME_WIDTH + 1;
/// Longest text a USER_IN input may display.
pub const MAX_INPUT_TEXT: usize = FRAME_WIDTH - 1;
/// Firmware timer resolution.
pub const TICKS_PER_SECOND: f64 = 32.0;
/// Reserved "no target" value in every 16-bit cross reference.
pub const SENTINEL: u16 = 0xFFFF;

/// Default text frame duration: a fixed floor plus time per character.
pub const TEXT_BASE_SECONDS: f64 = 0.5;
pub const TEXT_SECONDS_PER_CHAR: f64 = 0.03125;

/// How long an implicitly declared state shows its name.
pub const IMPLICIT_STATE_SECONDS: f64 = 5.0;

/// Name of the bootstrap state, always id 0.
pub const POST_STATE: &str = "POST";

/// Row kinds skipped entirely.
pub const IGNORED_INPUT_TYPES: &[&str] = &["", "COMMENT", "ACTIONS"];
/// Row kind that declares a new state.
pub const START_STATE: &str = "START_STATE";

/// Headings every sheet must carry.
pub const REQUIRED_HEADINGS: [&str; 6] = [
    "Input_type",
    "Input_detail",
    "Choice_share",
    "Result_duration",
    "Result_type",
    "Result_detail",
];

/// Descriptors the firmware knows about regardless of the sheet; they always
/// occupy the first slots of the descriptor table.
pub const WELL_KNOWN_DESCRIPTORS: &[&str] = &["POST", "BADGE_NEARBY", "BADGE_PAIRED", "NEW_BADGE", "UNLOCK"];

/// Animation name that explicitly clears an animation slot.
pub const NO_ANIMATION: &str = "NONE";

/// How the firmware formats a runtime value into a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Str,
    Int,
}

impl Placeholder {
    pub fn format_spec(self) -> &'static str {
        match self {
            Placeholder::Str => "%s",
            Placeholder::Int => "%d",
        }
    }
}

/// A `$name` that the firmware substitutes at display time.
/// Adding a variable means adding ONE entry here.
#[derive(Debug, Clone)]
pub struct TextVar {
    pub name: &'static str,
    pub placeholder: Placeholder,
    /// Display width reserved for the runtime value when wrapping.
    pub width: usize,
    /// Action type that tells the interpreter which value to splice in.
    pub action: ActionType,
    pub description: &'static str,
}

pub static TEXT_VARS: &[TextVar] = &[
    TextVar {
        name: "$badgename",
        placeholder: Placeholder::Str,
        width: 10,
        action: ActionType::TextBadgeName,
        description: "This badge's configured name",
    },
    TextVar {
        name: "$username",
        placeholder: Placeholder::Str,
        width: 10,
        action: ActionType::TextUserName,
        description: "Name of the badge's wearer",
    },
    TextVar {
        name: "$badgecount",
        placeholder: Placeholder::Int,
        width: 3,
        action: ActionType::TextBadgeCount,
        description: "Number of badges seen so far",
    },
];

/// Look up a variable by its `$name` (case-insensitive).
pub fn lookup_var(name: &str) -> Option<&'static TextVar> {
    TEXT_VARS.iter().find(|v| v.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_resolve_case_insensitively() {
        assert!(lookup_var("$BadgeName").is_some());
        assert!(lookup_var("$nobody").is_none());
    }

    #[test]
    fn var_actions_are_text_family() {
        for var in TEXT_VARS {
            assert!(var.action.is_text());
            assert!(var.width < FRAME_WIDTH);
        }
    }

    #[test]
    fn post_descriptor_is_well_known() {
        assert_eq!(WELL_KNOWN_DESCRIPTORS.first(), Some(&POST_STATE));
    }
}
