/// Who issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Read-only facts about one command invocation, supplied by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub author: Identity,
    pub channel: String,
    pub message: String,
    /// Enclosing group (server, workspace), when the conversation has one.
    pub group: Option<String>,
}
