use thiserror::Error;

/// A line typed into the interactive console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `d <n>`: select device `n`.
    SelectDevice(usize),
    /// `e <m>`: select effect `m` of the selected device.
    SelectEffect(usize),
    /// `n`: clear the device selection.
    Deselect,
    /// `l`: list devices and effects.
    List,
    /// `f <slot>`: toggle feedback of a gamepad slot.
    ToggleFeedback(usize),
    /// `h` or `?`.
    Help,
    /// `q`.
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{0} expects an index")]
    MissingIndex(&'static str),
    #[error("invalid index: {0}")]
    InvalidIndex(String),
    #[error("unexpected argument: {0}")]
    Trailing(String),
}

pub const HELP: &str = "commands: d <n> select device, e <m> select effect, n deselect, \
f <slot> toggle slot feedback, l list, q quit";

/// Parses one console line.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ParseError> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Err(ParseError::Empty);
    };
    let command = match cmd {
        "d" | "device" => ConsoleCommand::SelectDevice(index(parts.next(), "device")?),
        "e" | "effect" => ConsoleCommand::SelectEffect(index(parts.next(), "effect")?),
        "f" | "feedback" => ConsoleCommand::ToggleFeedback(index(parts.next(), "feedback")?),
        "n" | "none" => ConsoleCommand::Deselect,
        "l" | "list" => ConsoleCommand::List,
        "h" | "help" | "?" => ConsoleCommand::Help,
        "q" | "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    if let Some(extra) = parts.next() {
        return Err(ParseError::Trailing(extra.to_string()));
    }
    Ok(command)
}

fn index(value: Option<&str>, command: &'static str) -> Result<usize, ParseError> {
    let value = value.ok_or(ParseError::MissingIndex(command))?;
    value
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidIndex(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selection_commands() {
        assert_eq!(parse_command("d 1"), Ok(ConsoleCommand::SelectDevice(1)));
        assert_eq!(parse_command("  effect   3 "), Ok(ConsoleCommand::SelectEffect(3)));
        assert_eq!(parse_command("f 0"), Ok(ConsoleCommand::ToggleFeedback(0)));
        assert_eq!(parse_command("n"), Ok(ConsoleCommand::Deselect));
        assert_eq!(parse_command("q"), Ok(ConsoleCommand::Quit));
        assert_eq!(parse_command("?"), Ok(ConsoleCommand::Help));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(parse_command("d"), Err(ParseError::MissingIndex("device")));
        assert_eq!(
            parse_command("e -1"),
            Err(ParseError::InvalidIndex("-1".into()))
        );
        assert_eq!(parse_command("x"), Err(ParseError::Unknown("x".into())));
        assert_eq!(parse_command("l 2"), Err(ParseError::Trailing("2".into())));
    }
}
