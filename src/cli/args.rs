use clap::Parser;
use std::path::PathBuf;

/// Identity used for local commands when `--as` is not given.
pub const DEFAULT_IDENTITY: &str = "local";

#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(name = "opsconsole")]
#[command(
    about = "Operator console for a live host: modules, Python eval, shell and SQL",
    long_about = "Operator console for a live host: modules, Python eval, shell and SQL\n\nConfig file loading:\n  - --config <path> (explicit file, overrides default path discovery)\n  - Default probe path when --config is not provided:\n    1. $XDG_CONFIG_HOME/opsconsole/config.toml\n    2. ~/.config/opsconsole/config.toml\n\nOnly identities listed in `operators` (or OPSCONSOLE_OPERATORS) may run commands."
)]
pub struct CliArgs {
    /// Load config from this file path instead of the default discovery path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Identity the commands are issued as.
    #[arg(long = "as", value_name = "IDENTITY", default_value = DEFAULT_IDENTITY)]
    pub identity: String,

    /// Do not write a session trace file.
    #[arg(long)]
    pub no_trace: bool,

    /// Initialise the embedded Python interpreter and exit.
    #[arg(long)]
    pub smoke_python: bool,
}
