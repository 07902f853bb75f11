mod command;
mod context;
mod gate;

use std::borrow::Cow;
use std::sync::Arc;

pub use command::{COMMAND_PREFIX, Command, HELP_TEXT, ParseError, is_incomplete, parse_command};
pub use context::{Identity, InvocationContext};
pub use gate::{OperatorAllowlist, PermissionCheck, PermissionGate};

use crate::db::QueryRunner;
use crate::error::ConsoleError;
use crate::modules::ModuleManager;
use crate::python::{ConsoleView, EvalBindings, EvalSandbox, HostState};
use crate::render::{Fence, Paginator, RenderedPage, SecretRedactor, fit_to_budget, format_table};
use crate::shell::{ProcessRunner, ShellExecutor};

/// Fixed acknowledgment for commands that succeed without output.
pub const ACK: &str = "ok";

/// Delivers outbound messages to the conversation a command came from.
pub trait Transport: Send {
    /// # Errors
    ///
    /// Returns an error if the message could not be delivered.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), ConsoleError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    /// The permission gate refused the invoker; nothing was sent.
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    pub auth_token: Option<String>,
    pub message_budget: usize,
    pub sql_value_cap: usize,
    pub platform_module: Option<String>,
}

/// The operator console: one entry point per command, each behind the
/// permission gate.
pub struct Console<P, M, Q, R> {
    gate: PermissionGate<P>,
    modules: Arc<M>,
    database: Q,
    shell: ShellExecutor<R>,
    sandbox: EvalSandbox,
    host: Arc<HostState>,
    redactor: SecretRedactor,
    settings: ConsoleSettings,
}

impl<P, M, Q, R> Console<P, M, Q, R>
where
    P: PermissionCheck,
    M: ModuleManager + 'static,
    Q: QueryRunner,
    R: ProcessRunner,
{
    pub fn new(
        gate: PermissionGate<P>,
        modules: Arc<M>,
        database: Q,
        shell: ShellExecutor<R>,
        sandbox: EvalSandbox,
        host: Arc<HostState>,
        settings: ConsoleSettings,
    ) -> Self {
        let redactor = SecretRedactor::new(settings.auth_token.clone());
        Self {
            gate,
            modules,
            database,
            shell,
            sandbox,
            host,
            redactor,
            settings,
        }
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    /// Masks the configured secret in text the dispatcher reports on its own,
    /// such as echoed command lines and error messages.
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.redactor.redact(text)
    }

    /// Runs one command for `ctx`, sending its output through `transport`.
    ///
    /// # Errors
    ///
    /// Collaborator failures propagate unchanged for the dispatcher to report;
    /// [`ConsoleError::Cancelled`] means the invocation was cancelled.
    pub async fn handle<T: Transport>(
        &self,
        ctx: &InvocationContext,
        command: &Command,
        transport: &mut T,
    ) -> Result<Disposition, ConsoleError> {
        if !self.gate.allow(&ctx.author).await {
            tracing::info!(identity = %ctx.author.id, "console command refused");
            return Ok(Disposition::Denied);
        }

        match command {
            Command::Help => transport.send(HELP_TEXT).await?,
            Command::Load { module } => {
                self.modules.load(module)?;
                transport.send(ACK).await?;
            }
            Command::Unload { module } => {
                self.modules.unload(module)?;
                transport.send(ACK).await?;
            }
            Command::Reload { module } => {
                self.modules.reload(module)?;
                transport.send(ACK).await?;
            }
            Command::Eval { code } => {
                let message = self.eval(ctx, code).await?;
                transport.send(&message).await?;
            }
            Command::Exec { command } => {
                let message = self.exec(command).await?;
                transport.send(&message).await?;
            }
            Command::Sql { query } => match self.sql(query).await? {
                Some(pages) => {
                    for page in pages {
                        transport.send(page.as_str()).await?;
                    }
                }
                None => transport.send(ACK).await?,
            },
        }

        Ok(Disposition::Completed)
    }

    /// Evaluates `code` and returns the fenced, redacted, tail-truncated message.
    ///
    /// # Errors
    ///
    /// Returns an error on cancellation or interpreter failure; snippet errors
    /// are part of the message.
    pub async fn eval(&self, ctx: &InvocationContext, code: &str) -> Result<String, ConsoleError> {
        let modules: Arc<dyn ModuleManager> = self.modules.clone();
        let bindings = EvalBindings::new(
            Arc::clone(&self.host),
            modules,
            ConsoleView {
                message_budget: self.settings.message_budget,
                sql_value_cap: self.settings.sql_value_cap,
            },
            ctx.clone(),
        )
        .with_platform_module(self.settings.platform_module.clone());

        let outcome = self.sandbox.evaluate(code, bindings).await?;
        let text = outcome.render();
        let text = self.redactor.redact(&text);
        Ok(fit_to_budget(&text, Fence::PYTHON, self.settings.message_budget))
    }

    /// Runs `command` in a shell and returns the fenced, redacted, tail-truncated message.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub async fn exec(&self, command: &str) -> Result<String, ConsoleError> {
        let output = self.shell.run(command).await?;
        let text = output.combined();
        let text = self.redactor.redact(&text);
        Ok(fit_to_budget(&text, Fence::BASH, self.settings.message_budget))
    }

    /// Runs `query` and renders the rows as pages. `None` when no rows came back.
    ///
    /// # Errors
    ///
    /// Returns an error if the database rejects the query or a row cannot fit a page.
    pub async fn sql(&self, query: &str) -> Result<Option<Vec<RenderedPage>>, ConsoleError> {
        let result = self.database.fetch_all(query).await?;
        let Some(table) = format_table(
            &result.columns,
            &result.rows,
            self.settings.sql_value_cap,
            &self.redactor,
        ) else {
            return Ok(None);
        };

        let prefix = self.redactor.redact(&table.header_block()).into_owned();
        let rows: Vec<String> = table
            .rows
            .iter()
            .map(|row| self.redactor.redact(row).into_owned())
            .collect();

        let pages = Paginator::new(self.settings.message_budget, Fence::PLAIN).paginate(&prefix, &rows)?;
        Ok(Some(pages))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{
        ACK, Command, Console, ConsoleSettings, Disposition, Identity, InvocationContext,
        OperatorAllowlist, PermissionCheck, PermissionGate, Transport,
    };
    use crate::db::SqliteDatabase;
    use crate::error::{ConsoleError, ModuleError};
    use crate::modules::ModuleRegistry;
    use crate::python::{EvalSandbox, HostState};
    use crate::render::REDACTED_PLACEHOLDER;
    use crate::shell::{ProcessOutput, ProcessRunner, ShellExecutor};

    const TOKEN: &str = "MTIz.secret.token";

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<String>,
    }

    impl Transport for RecordingTransport {
        async fn send(&mut self, text: &str) -> Result<(), ConsoleError> {
            self.sent.push(text.to_string());
            Ok(())
        }
    }

    /// Reports canned streams and counts how often it was asked to spawn.
    #[derive(Default)]
    struct FakeRunner {
        output: ProcessOutput,
        spawned: AtomicUsize,
    }

    impl ProcessRunner for FakeRunner {
        async fn run_shell(&self, _command: &str) -> io::Result<ProcessOutput> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    type TestConsole = Console<OperatorAllowlist, ModuleRegistry, SqliteDatabase, FakeRunner>;

    async fn console_with(runner: FakeRunner, budget: usize) -> TestConsole {
        console_with_settings(
            runner,
            ConsoleSettings {
                auth_token: Some(TOKEN.to_string()),
                message_budget: budget,
                sql_value_cap: 30,
                platform_module: None,
            },
        )
        .await
    }

    async fn console_with_settings(runner: FakeRunner, settings: ConsoleSettings) -> TestConsole {
        let database = SqliteDatabase::connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        Console::new(
            PermissionGate::new(OperatorAllowlist::new(["1".to_string()])),
            Arc::new(ModuleRegistry::new("host.modules", ["greeter".to_string()])),
            database,
            ShellExecutor::new(runner),
            EvalSandbox::initialize().expect("python sandbox"),
            Arc::new(HostState::new("test-host")),
            settings,
        )
    }

    async fn console() -> TestConsole {
        console_with(FakeRunner::default(), 2000).await
    }

    fn ctx(author_id: &str) -> InvocationContext {
        InvocationContext {
            author: Identity::new(author_id, "tester"),
            channel: "ops".to_string(),
            message: String::new(),
            group: Some("staff".to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refused_identity_gets_no_output_and_no_side_effect() {
        let runner = FakeRunner::default();
        let console = console_with(runner, 2000).await;
        let mut transport = RecordingTransport::default();

        let disposition = console
            .handle(
                &ctx("999"),
                &Command::Exec {
                    command: "rm -rf /tmp/x".to_string(),
                },
                &mut transport,
            )
            .await
            .expect("handle");

        assert_eq!(disposition, Disposition::Denied);
        assert!(transport.sent.is_empty());
        assert_eq!(console.shell_runner().spawned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_permission_check_denies() {
        struct Unreachable;
        impl PermissionCheck for Unreachable {
            async fn is_operator(&self, _identity: &Identity) -> Result<bool, ConsoleError> {
                Err(ConsoleError::Permission("lookup failed".to_string()))
            }
        }

        let database = SqliteDatabase::connect("sqlite::memory:")
            .await
            .expect("database");
        let console = Console::new(
            PermissionGate::new(Unreachable),
            Arc::new(ModuleRegistry::new("host.modules", Vec::new())),
            database,
            ShellExecutor::new(FakeRunner::default()),
            EvalSandbox::initialize().expect("python sandbox"),
            Arc::new(HostState::new("test-host")),
            ConsoleSettings {
                auth_token: None,
                message_budget: 2000,
                sql_value_cap: 30,
                platform_module: None,
            },
        );
        let mut transport = RecordingTransport::default();

        let disposition = console
            .handle(&ctx("1"), &Command::Help, &mut transport)
            .await
            .expect("handle");
        assert_eq!(disposition, Disposition::Denied);
        assert!(transport.sent.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn module_commands_acknowledge_or_propagate() {
        let console = console().await;
        let mut transport = RecordingTransport::default();

        console
            .handle(
                &ctx("1"),
                &Command::Load {
                    module: "greeter".to_string(),
                },
                &mut transport,
            )
            .await
            .expect("load");
        assert_eq!(transport.sent, vec![ACK.to_string()]);

        let err = console
            .handle(
                &ctx("1"),
                &Command::Reload {
                    module: "missing".to_string(),
                },
                &mut transport,
            )
            .await
            .expect_err("reload of unloaded module");
        assert!(matches!(
            err,
            ConsoleError::Module(ModuleError::NotLoaded(ref name)) if name == "host.modules.missing"
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn eval_is_fenced_and_redacted() {
        let console = console().await;
        let message = console
            .eval(&ctx("1"), &format!("print('token: {TOKEN}')"))
            .await
            .expect("eval");
        assert_eq!(
            message,
            format!("```python\ntoken: {REDACTED_PLACEHOLDER}\n```")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn eval_keeps_the_tail_of_long_output() {
        let console = console().await;
        let message = console
            .eval(&ctx("1"), "for i in range(2000):\n    print(i)\nraise ValueError('last words')")
            .await
            .expect("eval");
        assert_eq!(message.chars().count(), 2000);
        assert!(message.ends_with("ValueError: last words\n```"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn eval_sees_invocation_bindings() {
        let console = console().await;
        let message = console
            .eval(&ctx("1"), "return (author.id, guild, host.name)")
            .await
            .expect("eval");
        assert_eq!(message, "```python\n('1', 'staff', 'test-host')```");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exec_labels_stderr_and_redacts() {
        let runner = FakeRunner {
            output: ProcessOutput {
                stdout: format!("env TOKEN={TOKEN}\n"),
                stderr: "warning\n".to_string(),
            },
            ..FakeRunner::default()
        };
        let console = console_with(runner, 2000).await;

        let message = console.exec("env").await.expect("exec");
        assert_eq!(
            message,
            format!("```bash\nSTDERR:\nwarning\nenv TOKEN={REDACTED_PLACEHOLDER}\n```")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exec_respects_budget() {
        let runner = FakeRunner {
            output: ProcessOutput {
                stdout: "y\n".repeat(3000),
                stderr: String::new(),
            },
            ..FakeRunner::default()
        };
        let console = console_with(runner, 2000).await;

        let message = console.exec("yes | head").await.expect("exec");
        assert_eq!(message.chars().count(), 2000);
        assert!(message.starts_with("```bash\n"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sql_with_no_rows_acknowledges() {
        let console = console().await;
        let mut transport = RecordingTransport::default();
        console
            .handle(
                &ctx("1"),
                &Command::Sql {
                    query: "CREATE TABLE t (id INTEGER)".to_string(),
                },
                &mut transport,
            )
            .await
            .expect("create table");
        assert_eq!(transport.sent, vec![ACK.to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sql_renders_capped_table() {
        let console = console().await;
        let pages = console
            .sql("SELECT 1 AS id, replace(hex(zeroblob(20)), '0', 'a') AS name")
            .await
            .expect("query")
            .expect("one row");

        assert_eq!(pages.len(), 1);
        let expected = format!(
            "```\nid | {}name{}\n---+-{}\n1  | {}..\n```",
            " ".repeat(13),
            " ".repeat(13),
            "-".repeat(30),
            "a".repeat(28),
        );
        assert_eq!(pages[0].as_str(), expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sql_redacts_tokens_longer_than_the_value_cap() {
        let token = "MTIzNDU2Nzg5MDEyMzQ1Njc4.GhIjKl.mnopqrstuvwxyz0123456789abcdefg";
        let console = console_with_settings(
            FakeRunner::default(),
            ConsoleSettings {
                auth_token: Some(token.to_string()),
                message_budget: 2000,
                sql_value_cap: 30,
                platform_module: None,
            },
        )
        .await;

        let pages = console
            .sql(&format!("SELECT '{token}' AS secret, 'x{token}' AS spliced"))
            .await
            .expect("query")
            .expect("one row");

        assert_eq!(pages.len(), 1);
        let page = pages[0].as_str();
        assert!(!page.contains(&token[..8]), "token prefix leaked: {page}");
        assert!(page.contains(&format!("{REDACTED_PLACEHOLDER} | x{REDACTED_PLACEHOLDER}")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sql_splits_long_results_across_pages() {
        let console = console_with(FakeRunner::default(), 200).await;
        let pages = console
            .sql("WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 100) SELECT i AS value FROM n")
            .await
            .expect("query")
            .expect("rows");

        assert!(pages.len() > 1);
        assert!(pages.iter().all(|page| page.as_str().chars().count() <= 200));
        assert!(pages[0].as_str().starts_with("```\nvalue\n-----\n1    \n"));
        assert!(pages[1].as_str().starts_with("```\n"));
        assert!(!pages[1].as_str().contains("value"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sql_error_propagates() {
        let console = console().await;
        let err = console.sql("SELECT * FROM missing_table").await.expect_err("no table");
        assert!(matches!(err, ConsoleError::Database(_)));
    }

    impl TestConsole {
        fn shell_runner(&self) -> &FakeRunner {
            self.shell.runner()
        }
    }
}
