use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::modules::DEFAULT_MODULE_NAMESPACE;
use crate::render::{DEFAULT_MESSAGE_BUDGET, DEFAULT_VALUE_CAP};
use crate::shell::DEFAULT_SHELL_PROGRAM;

pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
pub const MIN_MESSAGE_BUDGET: usize = 64;
pub const MIN_SQL_VALUE_CAP: usize = 3;

const CONFIG_DIR_NAME: &str = "opsconsole";
const CONFIG_FILE_NAME: &str = "config.toml";

const TOKEN_ENV: &str = "OPSCONSOLE_TOKEN";
const OPERATORS_ENV: &str = "OPSCONSOLE_OPERATORS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub config_path: PathBuf,
    pub auth_token: Option<String>,
    pub operators: Vec<String>,
    pub database_url: String,
    pub message_budget: usize,
    pub sql_value_cap: usize,
    /// `None` when command timeouts are disabled.
    pub command_timeout: Option<Duration>,
    pub modules: ModulesConfig,
    pub platform_module: Option<String>,
    pub shell_program: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulesConfig {
    pub namespace: String,
    pub available: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_MODULE_NAMESPACE.to_string(),
            available: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    auth_token: Option<String>,
    operators: Option<Vec<String>>,
    database_url: Option<String>,
    message_budget: Option<usize>,
    sql_value_cap: Option<usize>,
    command_timeout_secs: Option<u64>,
    modules: Option<RawModulesConfig>,
    eval: Option<RawEvalConfig>,
    shell: Option<RawShellConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModulesConfig {
    namespace: Option<String>,
    available: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEvalConfig {
    platform_module: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawShellConfig {
    program: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    /// Loads `explicit_path` when given, otherwise the discovered XDG config.
    /// An explicit path must exist; a discovered one may be absent.
    pub fn load_with_path(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = match explicit_path {
            Some(path) => {
                if !path.is_file() {
                    bail!(
                        "Failed to load config {}: file does not exist",
                        path.display()
                    );
                }
                path.to_path_buf()
            }
            None => discover_config_path()?,
        };
        let file_config = load_file_config(&config_path)?;

        dotenvy::dotenv().ok();

        Self::from_raw(config_path, file_config.unwrap_or_default())
    }

    fn from_raw(config_path: PathBuf, raw: RawFileConfig) -> Result<Self> {
        let message_budget = raw.message_budget.unwrap_or(DEFAULT_MESSAGE_BUDGET);
        if message_budget < MIN_MESSAGE_BUDGET {
            return Err(config_error(
                &config_path,
                "message_budget",
                &format!("must be at least {MIN_MESSAGE_BUDGET}"),
            ));
        }

        let sql_value_cap = raw.sql_value_cap.unwrap_or(DEFAULT_VALUE_CAP);
        if sql_value_cap < MIN_SQL_VALUE_CAP {
            return Err(config_error(
                &config_path,
                "sql_value_cap",
                &format!("must be at least {MIN_SQL_VALUE_CAP}"),
            ));
        }

        let command_timeout = match raw
            .command_timeout_secs
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let modules = validate_modules(raw.modules, &config_path)?;

        let file_token = raw
            .auth_token
            .as_deref()
            .and_then(non_empty)
            .map(ToOwned::to_owned);
        let file_operators = raw.operators.map(|ids| clean_list(&ids));

        Ok(Self {
            auth_token: env_non_empty(TOKEN_ENV).or(file_token),
            operators: env_non_empty(OPERATORS_ENV)
                .map(|value| clean_list(value.split(',')))
                .or(file_operators)
                .unwrap_or_default(),
            database_url: raw
                .database_url
                .as_deref()
                .and_then(non_empty)
                .unwrap_or(DEFAULT_DATABASE_URL)
                .to_string(),
            message_budget,
            sql_value_cap,
            command_timeout,
            modules,
            platform_module: raw
                .eval
                .and_then(|eval| eval.platform_module)
                .as_deref()
                .and_then(non_empty)
                .map(ToOwned::to_owned),
            shell_program: raw
                .shell
                .and_then(|shell| shell.program)
                .as_deref()
                .and_then(non_empty)
                .unwrap_or(DEFAULT_SHELL_PROGRAM)
                .to_string(),
            config_path,
        })
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow!("Failed to resolve config path: HOME directory is unavailable"))?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn validate_modules(raw: Option<RawModulesConfig>, config_path: &Path) -> Result<ModulesConfig> {
    let Some(raw) = raw else {
        return Ok(ModulesConfig::default());
    };

    let namespace = match raw.namespace {
        Some(namespace) => {
            let namespace = namespace.trim().trim_end_matches('.').to_string();
            if namespace.contains(char::is_whitespace) {
                return Err(config_error(
                    config_path,
                    "modules.namespace",
                    "must not contain whitespace",
                ));
            }
            namespace
        }
        None => DEFAULT_MODULE_NAMESPACE.to_string(),
    };

    let available = raw.available.unwrap_or_default();
    for name in &available {
        if name.trim().is_empty() || name.trim().contains(char::is_whitespace) {
            return Err(config_error(
                config_path,
                "modules.available",
                &format!("invalid module name '{name}'"),
            ));
        }
    }

    Ok(ModulesConfig {
        namespace,
        available: clean_list(&available),
    })
}

fn clean_list<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .filter_map(|value| non_empty(value.as_ref()).map(ToOwned::to_owned))
        .collect()
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|value| non_empty(&value).map(ToOwned::to_owned))
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn config_error(config_path: &Path, key_path: &str, reason: &str) -> anyhow::Error {
    anyhow!(
        "Failed to load config {}: {key_path}: {reason}",
        config_path.display()
    )
}
