mod args;
mod repl;

pub use args::{CliArgs, DEFAULT_IDENTITY};
pub use repl::{AppState, CONTINUATION_PROMPT, HostConsole, PROMPT, run_repl};
