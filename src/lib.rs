pub mod cli;
pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod modules;
pub mod python;
pub mod render;
pub mod shell;
pub mod trace;

use anyhow::{Result, anyhow};
use cli::{AppState, CliArgs, HostConsole, run_repl};
use config::AppConfig;
use console::{Console, ConsoleSettings, Identity, OperatorAllowlist, PermissionGate};
use db::SqliteDatabase;
use modules::ModuleRegistry;
use python::{EvalSandbox, HostState};
use shell::{ShellExecutor, TokioProcessRunner};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use trace::SessionTrace;
use tracing_subscriber::EnvFilter;

pub async fn run(args: CliArgs) -> Result<()> {
    init_tracing();

    if args.smoke_python {
        EvalSandbox::initialize()?;
        println!("smoke-python: ok");
        return Ok(());
    }

    let config = AppConfig::load_with_path(args.config.as_deref())?;
    let session_id = generate_session_id();
    let trace = if args.no_trace {
        SessionTrace::disabled()
    } else {
        SessionTrace::create(&session_id)?
    };

    let console = build_console(&config).await?;
    if config.operators.is_empty() {
        tracing::warn!("no operators configured, every command will be refused");
    }

    let mut app_state = AppState {
        session_id,
        console,
        identity: Identity::new(args.identity.clone(), args.identity),
        command_timeout: config.command_timeout,
        trace,
    };

    run_repl(&mut app_state).await
}

async fn build_console(config: &AppConfig) -> Result<HostConsole> {
    let sandbox = EvalSandbox::initialize()?;
    let database = SqliteDatabase::connect(&config.database_url)
        .await
        .map_err(|err| anyhow!("Failed to open database {}: {err}", config.database_url))?;
    let modules = ModuleRegistry::new(
        config.modules.namespace.clone(),
        config.modules.available.iter().cloned(),
    );

    Ok(Console::new(
        PermissionGate::new(OperatorAllowlist::new(config.operators.iter().cloned())),
        Arc::new(modules),
        database,
        ShellExecutor::new(TokioProcessRunner::new(config.shell_program.clone())),
        sandbox,
        Arc::new(HostState::new(env!("CARGO_PKG_NAME"))),
        ConsoleSettings {
            auth_token: config.auth_token.clone(),
            message_budget: config.message_budget,
            sql_value_cap: config.sql_value_cap,
            platform_module: config.platform_module.clone(),
        },
    ))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}
