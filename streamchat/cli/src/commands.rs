//! Input line parsing
//!
//! Lines starting with `/` are commands; anything else is a chat message.

/// One line of user input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Send a chat message
    Send(String),
    /// Resend the last user message of the active conversation
    Retry,
    /// Start a new conversation
    New,
    /// List conversations
    List,
    /// Make the n-th listed conversation (1-based) active
    Switch(usize),
    /// Rename the active conversation
    Rename(String),
    /// Delete the active conversation
    Delete,
    /// Select a model by id
    Model(String),
    /// List the built-in models
    Models,
    /// Show command help
    Help,
    /// Exit
    Quit,
    /// A command that could not be parsed, with a usage hint
    Invalid(String),
}

/// Help text for the interactive prompt
pub const HELP: &str = "\
Commands:
  /retry            resend the last message of this conversation
  /new              start a new conversation
  /list             list conversations
  /switch <n>       switch to conversation n (see /list)
  /rename <title>   rename this conversation
  /delete           delete this conversation
  /model <id>       select a model
  /models           list built-in models
  /help             show this help
  /quit             exit
Ctrl-C cancels a response in progress, or exits when idle.";

/// Parse one input line; `None` for a blank line
#[must_use]
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Send(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match (name, arg) {
        ("retry", "") => Command::Retry,
        ("new", "") => Command::New,
        ("list", "") => Command::List,
        ("delete", "") => Command::Delete,
        ("models", "") => Command::Models,
        ("help", "") => Command::Help,
        ("quit" | "exit", "") => Command::Quit,
        ("switch", n) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Command::Switch(n),
            _ => Command::Invalid("usage: /switch <n>".to_string()),
        },
        ("rename", "") => Command::Invalid("usage: /rename <title>".to_string()),
        ("rename", title) => Command::Rename(title.to_string()),
        ("model", "") => Command::Invalid("usage: /model <id>".to_string()),
        ("model", id) => Command::Model(id.to_string()),
        _ => Command::Invalid(format!("unknown command /{rest}, try /help")),
    };

    Some(command)
}
