use anyhow::{Result, anyhow, bail};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use time::macros::format_description;

const TRACE_DIR_NAME: &str = "opsconsole/traces";

/// Audit log of one console session: every command line, every outbound
/// message and every refusal or failure, one timestamped line each.
///
/// Callers only hand it text that already went through redaction.
#[derive(Clone, Default)]
pub struct SessionTrace {
    inner: Option<Arc<TraceInner>>,
}

struct TraceInner {
    writer: Mutex<BufWriter<File>>,
    file_path: PathBuf,
    write_failed: AtomicBool,
}

impl SessionTrace {
    pub fn create(session_id: &str) -> Result<Self> {
        let trace_dir = resolve_trace_dir_from_env()?;
        Self::create_in_dir(session_id, &trace_dir)
    }

    /// A trace that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn create_in_dir(session_id: &str, trace_dir: &Path) -> Result<Self> {
        fs::create_dir_all(trace_dir).map_err(|err| {
            anyhow!(
                "Failed to create trace directory {}: {err}",
                trace_dir.display()
            )
        })?;

        let file_path = trace_dir.join(format!("session-{session_id}.log"));
        let file = create_trace_file(&file_path)
            .map_err(|err| anyhow!("Failed to create trace file {}: {err}", file_path.display()))?;
        tracing::debug!(path = %file_path.display(), "session trace opened");

        Ok(Self {
            inner: Some(Arc::new(TraceInner {
                writer: Mutex::new(BufWriter::new(file)),
                file_path,
                write_failed: AtomicBool::new(false),
            })),
        })
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.inner.as_deref().map(|inner| inner.file_path.as_path())
    }

    pub fn log_command(&self, identity: &str, line: &str) {
        self.log_lines("cmd.in", &format!("{identity}: {line}"));
    }

    pub fn log_reply(&self, text: &str) {
        self.log_lines("cmd.out", text);
    }

    pub fn log_denied(&self, identity: &str) {
        self.log_single("cmd.deny", identity);
    }

    pub fn log_error(&self, message: &str) {
        self.log_lines("cmd.err", message);
    }

    fn log_lines(&self, kind: &str, text: &str) {
        if self.inner.is_none() {
            return;
        }
        if text.is_empty() {
            self.log_single(kind, "<empty>");
            return;
        }

        for line in text.lines() {
            self.log_single(kind, line);
        }
    }

    fn log_single(&self, kind: &str, text: &str) {
        let Some(inner) = self.inner.as_deref() else {
            return;
        };
        let timestamp = current_timestamp();
        inner.write_raw(&format!("[{timestamp}] [{kind:<11}] {text}\n"));
    }
}

impl TraceInner {
    fn write_raw(&self, text: &str) {
        let Ok(mut writer) = self.writer.lock() else {
            self.report_write_failure("failed to acquire trace writer lock");
            return;
        };

        if writer.write_all(text.as_bytes()).is_err() || writer.flush().is_err() {
            self.report_write_failure("failed to write to trace file");
        }
    }

    fn report_write_failure(&self, message: &str) {
        if !self.write_failed.swap(true, Ordering::Relaxed) {
            tracing::warn!(path = %self.file_path.display(), "{message}");
        }
    }
}

#[cfg(unix)]
fn create_trace_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_trace_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn current_timestamp() -> String {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    OffsetDateTime::now_utc()
        .format(format)
        .unwrap_or_else(|_| "0000-00-00T00:00:00.000Z".to_string())
}

pub fn resolve_trace_dir_from_env() -> Result<PathBuf> {
    let xdg_state = env::var("XDG_STATE_HOME").ok();
    let home = dirs::home_dir();
    resolve_trace_dir(xdg_state.as_deref(), home.as_deref())
}

fn resolve_trace_dir(xdg_state_home: Option<&str>, home_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(xdg) = xdg_state_home {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve trace path: XDG_STATE_HOME is set but empty");
        }
        return Ok(PathBuf::from(trimmed).join(TRACE_DIR_NAME));
    }

    let home = home_dir
        .ok_or_else(|| anyhow!("Failed to resolve trace path: HOME directory is unavailable"))?;
    Ok(home.join(".local/state").join(TRACE_DIR_NAME))
}
