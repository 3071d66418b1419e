//! Runtime control requests received on the command channel.

/// A parsed runtime command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Cancel the running job at the next instruction boundary.
    Stop,
    /// Relative move; the argument is passed to the device untouched (e.g. `X10`).
    RelativeMove(String),
    /// Home the given axes. Empty means every axis.
    Home(Vec<String>),
    /// Send the text as-is and relay every reply.
    RawPassthrough(String),
}

impl Command {
    /// Parse a control message by its leading keyword.
    ///
    /// Returns `None` for unknown keywords and for `rmove`/`raw` without an
    /// argument. Arguments are not validated beyond being non-empty; the
    /// device is the authority on syntax.
    pub fn parse(message: &str) -> Option<Command> {
        let message = message.trim();
        let (keyword, rest) = match message.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (message, ""),
        };

        match keyword {
            "stop" if rest.is_empty() => Some(Command::Stop),
            "rmove" if !rest.is_empty() => Some(Command::RelativeMove(rest.to_string())),
            "home" => Some(Command::Home(
                rest.split_whitespace().map(str::to_string).collect(),
            )),
            "raw" if !rest.is_empty() => Some(Command::RawPassthrough(rest.to_string())),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Stop => "stop",
            Command::RelativeMove(_) => "rmove",
            Command::Home(_) => "home",
            Command::RawPassthrough(_) => "raw",
        }
    }
}
