//! Command catalog shared by the parser and the `help` command.
//!
//! Keeping names, usage strings, and keyword tables in one place means the
//! grammar and the help output cannot drift apart.

use super::grammar::{ButtonCommand, ThresholdKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Sample,
    Count,
    Switches,
    Button,
    Threshold,
    Advance,
    Status,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub usage: &'static str,
    pub summary: &'static str,
}

/// Keyword accepted at a fixed argument position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Choice<T> {
    pub keyword: &'static str,
    pub value: T,
}

pub const COMMANDS: [CommandSpec; 8] = [
    CommandSpec {
        name: "sample",
        tag: CommandTag::Sample,
        usage: "sample <hz>",
        summary: "feed an instantaneous frequency reading",
    },
    CommandSpec {
        name: "count",
        tag: CommandTag::Count,
        usage: "count <samples>",
        summary: "feed a frequency analyser count (16000 / count Hz)",
    },
    CommandSpec {
        name: "switches",
        tag: CommandTag::Switches,
        usage: "switches <mask>",
        summary: "set the load switch positions (decimal or 0b...)",
    },
    CommandSpec {
        name: "button",
        tag: CommandTag::Button,
        usage: "button maintenance|volatile|stable",
        summary: "press the maintenance or volatility override button",
    },
    CommandSpec {
        name: "threshold",
        tag: CommandTag::Threshold,
        usage: "threshold freq <hz> | threshold roc <hz/s>",
        summary: "change a stability threshold",
    },
    CommandSpec {
        name: "advance",
        tag: CommandTag::Advance,
        usage: "advance <duration>",
        summary: "move the clock forward (e.g. 250ms, 2s)",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        usage: "status",
        summary: "show mode, loads, stability, and timer",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        usage: "help [command]",
        summary: "list commands or describe one",
    },
];

pub const BUTTON_CHOICES: [Choice<ButtonCommand>; 3] = [
    Choice {
        keyword: "maintenance",
        value: ButtonCommand::Maintenance,
    },
    Choice {
        keyword: "volatile",
        value: ButtonCommand::Volatile,
    },
    Choice {
        keyword: "stable",
        value: ButtonCommand::Stable,
    },
];

pub const THRESHOLD_CHOICES: [Choice<ThresholdKind>; 2] = [
    Choice {
        keyword: "freq",
        value: ThresholdKind::Frequency,
    },
    Choice {
        keyword: "roc",
        value: ThresholdKind::RateOfChange,
    },
];

/// Looks up a command by name, ignoring ASCII case.
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// Looks up a keyword in a choice table, ignoring ASCII case.
#[must_use]
pub fn find_choice<T: Copy>(choices: &[Choice<T>], keyword: &str) -> Option<T> {
    choices
        .iter()
        .find(|choice| choice.keyword.eq_ignore_ascii_case(keyword))
        .map(|choice| choice.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_are_unique() {
        for (index, spec) in COMMANDS.iter().enumerate() {
            assert!(
                COMMANDS[index + 1..]
                    .iter()
                    .all(|other| !other.name.eq_ignore_ascii_case(spec.name))
            );
        }
    }

    #[test]
    fn lookups_ignore_case() {
        assert_eq!(find("STATUS").map(|spec| spec.tag), Some(CommandTag::Status));
        assert_eq!(
            find_choice(&BUTTON_CHOICES, "Volatile"),
            Some(ButtonCommand::Volatile)
        );
        assert_eq!(find_choice(&THRESHOLD_CHOICES, "rate"), None);
    }
}
