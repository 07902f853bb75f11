#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Load { module: String },
    Unload { module: String },
    Reload { module: String },
    Eval { code: String },
    Exec { command: String },
    Sql { query: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Optional prefix the chat-side dispatcher uses for console commands.
pub const COMMAND_PREFIX: char = '!';

pub const HELP_TEXT: &str = "Available commands:\n  help                Show this command list\n  load <module>       Load a behavior module\n  unload <module>     Unload a behavior module\n  reload <module>     Reload a behavior module\n  eval <code>         Evaluate Python code against the live host (fences allowed)\n  exec <command>      Run a shell command\n  sql <query>         Run a query against the host database";

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix(COMMAND_PREFIX).unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(ParseError::new("empty command. Try help"));
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").to_ascii_lowercase();
    let rest = parts.next().map(str::trim).unwrap_or("");

    match name.as_str() {
        "help" => {
            if rest.is_empty() {
                Ok(Command::Help)
            } else {
                Err(ParseError::new("usage: help"))
            }
        }
        "load" => parse_module(rest, "usage: load <module>").map(|module| Command::Load { module }),
        "unload" => {
            parse_module(rest, "usage: unload <module>").map(|module| Command::Unload { module })
        }
        "reload" => {
            parse_module(rest, "usage: reload <module>").map(|module| Command::Reload { module })
        }
        "eval" => parse_required_text_arg(rest, "usage: eval <code>").map(|code| Command::Eval { code }),
        "exec" => parse_required_text_arg(rest, "usage: exec <command>")
            .map(|command| Command::Exec { command }),
        "sql" => parse_required_text_arg(rest, "usage: sql <query>").map(|query| Command::Sql { query }),
        _ => Err(ParseError::new(format!("unknown command '{name}'. Try help"))),
    }
}

/// True while `line` is an `eval` whose opening code fence has not been closed yet.
pub fn is_incomplete(line: &str) -> bool {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix(COMMAND_PREFIX).unwrap_or(trimmed);
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    if !parts.next().is_some_and(|name| name.eq_ignore_ascii_case("eval")) {
        return false;
    }
    let code = parts.next().map(str::trim).unwrap_or("");
    code.starts_with("```") && (code.len() < 6 || !code.ends_with("```"))
}

fn parse_module(rest: &str, usage: &str) -> Result<String, ParseError> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(ParseError::new(usage));
    }
    Ok(rest.to_string())
}

fn parse_required_text_arg(rest: &str, usage: &str) -> Result<String, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::new(usage));
    }
    Ok(rest.to_string())
}
