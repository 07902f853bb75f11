use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule};

use crate::console::InvocationContext;
use crate::modules::ModuleManager;

/// Long-lived host state reachable from evaluated code.
///
/// `vars` is a scratch area operator snippets may read and write across
/// invocations; nothing else in the console touches it.
#[derive(Debug)]
pub struct HostState {
    name: String,
    started_at: Instant,
    vars: Mutex<BTreeMap<String, String>>,
}

impl HostState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Instant::now(),
            vars: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var(&self, key: &str) -> Option<String> {
        self.vars().get(key).cloned()
    }

    pub fn set_var(&self, key: impl Into<String>, value: impl Into<String>) {
        self.vars().insert(key.into(), value.into());
    }

    fn vars(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.vars.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Console limits as seen by evaluated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleView {
    pub message_budget: usize,
    pub sql_value_cap: usize,
}

#[pyclass(frozen, name = "Host", module = "opsconsole")]
struct HostHandle {
    state: Arc<HostState>,
    modules: Arc<dyn ModuleManager>,
}

#[pymethods]
impl HostHandle {
    #[getter]
    fn name(&self) -> String {
        self.state.name.clone()
    }

    #[getter]
    fn uptime(&self) -> f64 {
        self.state.started_at.elapsed().as_secs_f64()
    }

    fn modules(&self) -> Vec<String> {
        self.modules.loaded()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.state.var(key)
    }

    fn set(&self, key: String, value: String) {
        self.state.set_var(key, value);
    }

    fn __repr__(&self) -> String {
        format!("<Host {}>", self.state.name)
    }
}

#[pyclass(frozen, name = "Console", module = "opsconsole")]
struct ConsoleHandle {
    view: ConsoleView,
}

#[pymethods]
impl ConsoleHandle {
    #[getter]
    fn message_budget(&self) -> usize {
        self.view.message_budget
    }

    #[getter]
    fn sql_value_cap(&self) -> usize {
        self.view.sql_value_cap
    }

    #[getter]
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn __repr__(&self) -> String {
        format!("<Console v{}>", env!("CARGO_PKG_VERSION"))
    }
}

/// Names injected into one evaluation: `console`, `host`, `ctx`, `message`,
/// `author`, `channel`, `guild` and, when configured, `platform`.
///
/// Built fresh for every invocation and turned into a new globals dict, so
/// nothing a snippet defines survives into the next one.
#[derive(Clone)]
pub struct EvalBindings {
    host: Arc<HostState>,
    modules: Arc<dyn ModuleManager>,
    console: ConsoleView,
    context: InvocationContext,
    platform_module: Option<String>,
}

impl EvalBindings {
    pub fn new(
        host: Arc<HostState>,
        modules: Arc<dyn ModuleManager>,
        console: ConsoleView,
        context: InvocationContext,
    ) -> Self {
        Self {
            host,
            modules,
            console,
            context,
            platform_module: None,
        }
    }

    /// Binds the Python module `name` as `platform`.
    pub fn with_platform_module(mut self, name: Option<String>) -> Self {
        self.platform_module = name;
        self
    }

    pub(crate) fn to_globals<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let globals = PyDict::new(py);

        globals.set_item(
            "console",
            Bound::new(py, ConsoleHandle { view: self.console })?,
        )?;
        globals.set_item(
            "host",
            Bound::new(
                py,
                HostHandle {
                    state: Arc::clone(&self.host),
                    modules: Arc::clone(&self.modules),
                },
            )?,
        )?;

        let ctx = self.context_namespace(py)?;
        for field in ["message", "author", "channel", "guild"] {
            globals.set_item(field, ctx.getattr(field)?)?;
        }
        globals.set_item("ctx", ctx)?;

        if let Some(name) = &self.platform_module {
            globals.set_item("platform", PyModule::import(py, name.as_str())?)?;
        }

        Ok(globals)
    }

    fn context_namespace<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        let namespace = PyModule::import(py, "types")?.getattr("SimpleNamespace")?;

        let author = PyDict::new(py);
        author.set_item("id", &self.context.author.id)?;
        author.set_item("name", &self.context.author.name)?;

        let fields = PyDict::new(py);
        fields.set_item("author", namespace.call((), Some(&author))?)?;
        fields.set_item("channel", &self.context.channel)?;
        fields.set_item("message", &self.context.message)?;
        fields.set_item("guild", self.context.group.as_deref())?;

        namespace.call((), Some(&fields))
    }
}

#[cfg(test)]
mod tests {
    use super::HostState;

    #[test]
    fn host_vars_are_shared_through_the_state() {
        let host = HostState::new("test-host");
        assert_eq!(host.var("greeting"), None);
        host.set_var("greeting", "hi");
        assert_eq!(host.var("greeting").as_deref(), Some("hi"));
        assert_eq!(host.name(), "test-host");
    }
}
