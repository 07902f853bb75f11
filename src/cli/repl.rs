use crate::console::{
    Command, Console, Disposition, Identity, InvocationContext, OperatorAllowlist, Transport,
    is_incomplete, parse_command,
};
use crate::db::SqliteDatabase;
use crate::error::ConsoleError;
use crate::modules::ModuleRegistry;
use crate::shell::TokioProcessRunner;
use crate::trace::SessionTrace;
use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub const PROMPT: &str = "op> ";
pub const CONTINUATION_PROMPT: &str = "... ";

const LOCAL_CHANNEL: &str = "console";

pub type HostConsole = Console<OperatorAllowlist, ModuleRegistry, SqliteDatabase, TokioProcessRunner>;

pub struct AppState {
    pub session_id: String,
    pub console: HostConsole,
    pub identity: Identity,
    pub command_timeout: Option<Duration>,
    pub trace: SessionTrace,
}

impl AppState {
    fn context_for(&self, line: &str) -> InvocationContext {
        InvocationContext {
            author: self.identity.clone(),
            channel: LOCAL_CHANNEL.to_string(),
            message: line.to_string(),
            group: None,
        }
    }
}

/// Writes each outbound message to stdout and records it in the session trace.
struct StdoutTransport {
    stdout: tokio::io::Stdout,
    trace: SessionTrace,
}

impl Transport for StdoutTransport {
    async fn send(&mut self, text: &str) -> Result<(), ConsoleError> {
        self.trace.log_reply(text);
        write_line(&mut self.stdout, text)
            .await
            .map_err(|err| ConsoleError::Transport(err.to_string()))
    }
}

pub async fn run_repl(state: &mut AppState) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    tracing::debug!(session = %state.session_id, "console session started");

    loop {
        write_prompt(&mut stdout, PROMPT).await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let mut input = line.to_string();
        while is_incomplete(&input) {
            write_prompt(&mut stdout, CONTINUATION_PROMPT).await?;
            let Some(next) = lines.next_line().await? else {
                break;
            };
            input.push('\n');
            input.push_str(&next);
        }

        handle_line(state, &input).await?;
    }

    Ok(())
}

async fn handle_line(state: &AppState, line: &str) -> Result<()> {
    state
        .trace
        .log_command(&state.identity.id, &state.console.redact(line));

    let command = match parse_command(line) {
        Ok(command) => command,
        Err(err) => return report_error(state, err.message()).await,
    };

    let ctx = state.context_for(line);
    match dispatch(state, &ctx, &command).await {
        Ok(Disposition::Completed) => Ok(()),
        Ok(Disposition::Denied) => {
            state.trace.log_denied(&ctx.author.id);
            Ok(())
        }
        Err(err) => match operator_error(&err) {
            Some(message) => report_error(state, &state.console.redact(&message)).await,
            None => {
                tracing::debug!(identity = %ctx.author.id, "console command cancelled");
                Ok(())
            }
        },
    }
}

/// Message shown to the operator for a failed command. Cancellation is silent.
fn operator_error(err: &ConsoleError) -> Option<String> {
    match err {
        ConsoleError::Cancelled => None,
        other => Some(other.to_string()),
    }
}

async fn dispatch(
    state: &AppState,
    ctx: &InvocationContext,
    command: &Command,
) -> Result<Disposition, ConsoleError> {
    let mut transport = StdoutTransport {
        stdout: tokio::io::stdout(),
        trace: state.trace.clone(),
    };
    let invocation = state.console.handle(ctx, command, &mut transport);

    let Some(limit) = state.command_timeout else {
        return invocation.await;
    };
    match tokio::time::timeout(limit, invocation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_secs = limit.as_secs(), "console command timed out");
            Err(ConsoleError::TimedOut(limit))
        }
    }
}

async fn report_error(state: &AppState, message: &str) -> Result<()> {
    state.trace.log_error(message);
    let mut stdout = tokio::io::stdout();
    write_line(&mut stdout, &format!("error: {message}")).await?;
    Ok(())
}

async fn write_prompt<W: AsyncWrite + Unpin>(out: &mut W, prompt: &str) -> std::io::Result<()> {
    out.write_all(prompt.as_bytes()).await?;
    out.flush().await
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    if !text.ends_with('\n') {
        out.write_all(b"\n").await?;
    }
    out.flush().await
}
