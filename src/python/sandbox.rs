use std::ffi::CString;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use pyo3::exceptions::asyncio::CancelledError;
use pyo3::exceptions::{PyKeyboardInterrupt, PySystemExit};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule};
use thiserror::Error;

use super::bindings::EvalBindings;
use crate::error::ConsoleError;

/// Shown when a snippet neither printed nor returned anything.
pub const EMPTY_RESULT_PLACEHOLDER: &str = "Evaluated";

const HELPER_SOURCE: &str = include_str!("eval_helper.py");

// stdout capture swaps `sys.stdout` for the whole interpreter.
static EVAL_LOCK: Mutex<()> = Mutex::new(());

/// Result of evaluating one snippet. Exactly one variant per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// The snippet did not compile; nothing ran.
    CompileError { exc_type: String, message: String },
    RuntimeError { stdout: String, traceback: String },
    Success {
        stdout: String,
        returned: Option<String>,
    },
}

impl EvalOutcome {
    /// Text shown to the operator, before redaction and truncation.
    pub fn render(&self) -> String {
        match self {
            Self::CompileError { exc_type, message } => format!("{exc_type}: {message}"),
            Self::RuntimeError { stdout, traceback } => format!("{stdout}{traceback}"),
            Self::Success {
                stdout,
                returned: Some(value),
            } => format!("{stdout}{value}"),
            Self::Success {
                stdout,
                returned: None,
            } if stdout.is_empty() => EMPTY_RESULT_PLACEHOLDER.to_string(),
            Self::Success { stdout, .. } => stdout.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    /// Cancellation reached the snippet; it must not be turned into a result.
    #[error("evaluation cancelled")]
    Cancelled,

    #[error("interpreter failure: {0}")]
    Internal(String),
}

impl From<PyErr> for EvalError {
    fn from(err: PyErr) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<EvalError> for ConsoleError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Cancelled => Self::Cancelled,
            EvalError::Internal(message) => Self::Eval(message),
        }
    }
}

/// Strips a surrounding code fence and its language line. Unfenced text is
/// returned unchanged.
pub fn strip_code_fence(code: &str) -> &str {
    let trimmed = code.trim();
    if !(trimmed.starts_with("```") && trimmed.ends_with("```")) {
        return code;
    }

    let inner = &trimmed[..trimmed.len() - 3];
    inner.split_once('\n').map_or("", |(_, body)| body)
}

/// Compiles and runs operator snippets as the body of a one-shot `async def`
/// on the embedded interpreter.
///
/// Evaluation happens on a blocking worker thread with a private asyncio loop,
/// so the caller's runtime keeps serving other work meanwhile.
#[derive(Clone)]
pub struct EvalSandbox {
    helper: Arc<Py<PyModule>>,
}

impl EvalSandbox {
    pub fn initialize() -> Result<Self> {
        Python::attach(|py| -> Result<Self> {
            let source = CString::new(HELPER_SOURCE)?;
            let helper = PyModule::from_code(
                py,
                source.as_c_str(),
                c"opsconsole_eval.py",
                c"opsconsole_eval",
            )?;
            let sandbox = Self {
                helper: Arc::new(helper.unbind()),
            };

            if !sandbox.is_healthy() {
                anyhow::bail!("python sandbox failed health check");
            }
            Ok(sandbox)
        })
    }

    pub fn is_healthy(&self) -> bool {
        Python::attach(|py| {
            self.helper
                .bind(py)
                .getattr("health_check")
                .and_then(|check| check.call0())
                .and_then(|healthy| healthy.is_truthy())
                .unwrap_or(false)
        })
    }

    /// # Errors
    ///
    /// [`EvalError::Cancelled`] when cancellation reached the snippet or its
    /// worker; [`EvalError::Internal`] when the interpreter itself misbehaved.
    /// Failures of the snippet are reported inside [`EvalOutcome`].
    pub async fn evaluate(
        &self,
        code: &str,
        bindings: EvalBindings,
    ) -> Result<EvalOutcome, EvalError> {
        let program = strip_code_fence(code).to_owned();
        let helper = Arc::clone(&self.helper);

        let worker =
            tokio::task::spawn_blocking(move || evaluate_blocking(&helper, &program, &bindings));

        match worker.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => Err(EvalError::Cancelled),
            Err(err) => Err(EvalError::Internal(format!("eval worker panicked: {err}"))),
        }
    }
}

fn evaluate_blocking(
    helper: &Py<PyModule>,
    program: &str,
    bindings: &EvalBindings,
) -> Result<EvalOutcome, EvalError> {
    let _serial = EVAL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    Python::attach(|py| -> Result<EvalOutcome, EvalError> {
        let globals = bindings.to_globals(py)?;
        let result = match helper
            .bind(py)
            .getattr("run_snippet")?
            .call1((program, globals))
        {
            Ok(result) => result,
            Err(err) if is_cancellation(py, &err) => return Err(EvalError::Cancelled),
            Err(err) => return Err(err.into()),
        };
        outcome_from_result(&result)
    })
}

fn is_cancellation(py: Python<'_>, err: &PyErr) -> bool {
    err.is_instance_of::<CancelledError>(py)
        || err.is_instance_of::<PyKeyboardInterrupt>(py)
        || err.is_instance_of::<PySystemExit>(py)
}

fn outcome_from_result(result: &Bound<'_, PyAny>) -> Result<EvalOutcome, EvalError> {
    let dict = result
        .cast::<PyDict>()
        .map_err(|err| EvalError::Internal(err.to_string()))?;
    let kind = dict_string(dict, "kind")?;

    match kind.as_str() {
        "compile_error" => Ok(EvalOutcome::CompileError {
            exc_type: dict_string(dict, "exc_type")?,
            message: dict_string(dict, "message")?,
        }),
        "runtime_error" => Ok(EvalOutcome::RuntimeError {
            stdout: dict_string(dict, "stdout")?,
            traceback: dict_string(dict, "traceback")?,
        }),
        "success" => Ok(EvalOutcome::Success {
            stdout: dict_string(dict, "stdout")?,
            returned: dict_field(dict, "returned")?
                .extract::<Option<String>>()
                .map_err(|err| EvalError::Internal(err.to_string()))?,
        }),
        _ => Err(EvalError::Internal(format!("unknown eval result kind: {kind}"))),
    }
}

fn dict_field<'py>(dict: &Bound<'py, PyDict>, key: &str) -> Result<Bound<'py, PyAny>, EvalError> {
    dict.get_item(key)?
        .ok_or_else(|| EvalError::Internal(format!("missing {key} in eval result")))
}

fn dict_string(dict: &Bound<'_, PyDict>, key: &str) -> Result<String, EvalError> {
    dict_field(dict, key)?
        .extract::<String>()
        .map_err(|err| EvalError::Internal(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{EMPTY_RESULT_PLACEHOLDER, EvalError, EvalOutcome, EvalSandbox, strip_code_fence};
    use crate::console::{Identity, InvocationContext};
    use crate::modules::{ModuleManager, ModuleRegistry};
    use crate::python::{ConsoleView, EvalBindings, HostState};

    fn bindings_with(host: Arc<HostState>, modules: Arc<ModuleRegistry>) -> EvalBindings {
        EvalBindings::new(
            host,
            modules,
            ConsoleView {
                message_budget: 2000,
                sql_value_cap: 30,
            },
            InvocationContext {
                author: Identity::new("42", "ada"),
                channel: "ops".to_string(),
                message: "eval ...".to_string(),
                group: None,
            },
        )
    }

    fn bindings() -> EvalBindings {
        bindings_with(
            Arc::new(HostState::new("test-host")),
            Arc::new(ModuleRegistry::new("host.modules", Vec::new())),
        )
    }

    async fn eval(code: &str) -> EvalOutcome {
        let sandbox = EvalSandbox::initialize().expect("python sandbox");
        sandbox.evaluate(code, bindings()).await.expect("evaluate")
    }

    #[test]
    fn strip_code_fence_drops_markers_and_language_line() {
        assert_eq!(strip_code_fence("```py\nprint(1)\n```"), "print(1)\n");
        assert_eq!(strip_code_fence("  ```\nx = 1```  "), "x = 1");
        assert_eq!(strip_code_fence("print(1)"), "print(1)");
        assert_eq!(strip_code_fence("```print(1)```"), "");
    }

    #[test]
    fn render_uses_placeholder_only_when_silent() {
        let silent = EvalOutcome::Success {
            stdout: String::new(),
            returned: None,
        };
        assert_eq!(silent.render(), EMPTY_RESULT_PLACEHOLDER);

        let printed = EvalOutcome::Success {
            stdout: "hi\n".to_string(),
            returned: None,
        };
        assert_eq!(printed.render(), "hi\n");

        let returned = EvalOutcome::Success {
            stdout: "hi\n".to_string(),
            returned: Some("3".to_string()),
        };
        assert_eq!(returned.render(), "hi\n3");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn returned_value_follows_printed_output() {
        let outcome = eval("print('hello')\nreturn 40 + 2").await;
        assert_eq!(
            outcome,
            EvalOutcome::Success {
                stdout: "hello\n".to_string(),
                returned: Some("42".to_string()),
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn silent_snippet_renders_placeholder() {
        let outcome = eval("x = 1").await;
        assert_eq!(outcome.render(), "Evaluated");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn compile_error_is_one_line_without_trace() {
        let outcome = eval("def broken(:\n  pass").await;
        let EvalOutcome::CompileError { exc_type, .. } = &outcome else {
            panic!("expected compile error, got {outcome:?}");
        };
        assert_eq!(exc_type, "SyntaxError");
        assert!(outcome.render().starts_with("SyntaxError: "));
        assert!(!outcome.render().contains("Traceback"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runtime_error_keeps_output_before_trace() {
        let outcome = eval("print('before')\n1 / 0").await;
        let rendered = outcome.render();
        assert!(matches!(outcome, EvalOutcome::RuntimeError { .. }));
        assert!(rendered.starts_with("before\nTraceback (most recent call last):"));
        assert!(rendered.contains("ZeroDivisionError: division by zero"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fenced_and_unfenced_snippets_agree() {
        let fenced = eval("```python\nprint('a')\nreturn 'b'\n```").await;
        let plain = eval("print('a')\nreturn 'b'").await;
        assert_eq!(fenced, plain);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn snippet_may_await() {
        let outcome = eval("import asyncio\nawait asyncio.sleep(0)\nreturn 'done'").await;
        assert_eq!(outcome.render(), "done");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_propagates_instead_of_becoming_a_result() {
        let sandbox = EvalSandbox::initialize().expect("python sandbox");
        let err = sandbox
            .evaluate("import asyncio\nraise asyncio.CancelledError()", bindings())
            .await
            .expect_err("cancellation escapes");
        assert!(matches!(err, EvalError::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bindings_expose_context_and_live_host() {
        let host = Arc::new(HostState::new("test-host"));
        let modules = Arc::new(ModuleRegistry::new("host.modules", ["greeter".to_string()]));
        modules.load("greeter").expect("load greeter");
        let sandbox = EvalSandbox::initialize().expect("python sandbox");

        let outcome = sandbox
            .evaluate(
                "host.set('seen', author.name)\nreturn (ctx.channel, guild, host.modules(), console.sql_value_cap)",
                bindings_with(Arc::clone(&host), Arc::clone(&modules)),
            )
            .await
            .expect("evaluate");

        assert_eq!(
            outcome.render(),
            "('ops', None, ['host.modules.greeter'], 30)"
        );
        assert_eq!(host.var("seen").as_deref(), Some("ada"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn definitions_do_not_leak_between_invocations() {
        let sandbox = EvalSandbox::initialize().expect("python sandbox");
        sandbox
            .evaluate("global leaked\nleaked = 1", bindings())
            .await
            .expect("first evaluate");
        let outcome = sandbox
            .evaluate("return leaked", bindings())
            .await
            .expect("second evaluate");
        assert!(matches!(outcome, EvalOutcome::RuntimeError { ref traceback, .. } if traceback.contains("NameError")));
    }
}
