use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ModuleError;

pub const DEFAULT_MODULE_NAMESPACE: &str = "host.modules";

/// Loads and unloads the host's behavior modules.
pub trait ModuleManager: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the module is unknown or already loaded.
    fn load(&self, name: &str) -> Result<(), ModuleError>;

    /// # Errors
    ///
    /// Returns an error if the module is not loaded.
    fn unload(&self, name: &str) -> Result<(), ModuleError>;

    /// # Errors
    ///
    /// Returns an error if the module is not loaded.
    fn reload(&self, name: &str) -> Result<(), ModuleError>;

    /// Fully qualified names of the loaded modules, sorted.
    fn loaded(&self) -> Vec<String>;
}

/// In-process module table backing the stand-alone console.
///
/// Short names given by the operator are qualified with the namespace before
/// they are looked up, so `load greeter` refers to `host.modules.greeter`.
#[derive(Debug)]
pub struct ModuleRegistry {
    namespace: String,
    available: BTreeSet<String>,
    loaded: Mutex<BTreeSet<String>>,
}

impl ModuleRegistry {
    pub fn new(namespace: impl Into<String>, available: impl IntoIterator<Item = String>) -> Self {
        Self {
            namespace: namespace.into(),
            available: available.into_iter().collect(),
            loaded: Mutex::new(BTreeSet::new()),
        }
    }

    fn qualify(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.namespace)
        }
    }

    fn loaded_set(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModuleManager for ModuleRegistry {
    fn load(&self, name: &str) -> Result<(), ModuleError> {
        let qualified = self.qualify(name);
        if !self.available.contains(name) {
            return Err(ModuleError::Unknown(qualified));
        }
        if !self.loaded_set().insert(qualified.clone()) {
            return Err(ModuleError::AlreadyLoaded(qualified));
        }
        tracing::info!(module = %qualified, "module loaded");
        Ok(())
    }

    fn unload(&self, name: &str) -> Result<(), ModuleError> {
        let qualified = self.qualify(name);
        if !self.loaded_set().remove(&qualified) {
            return Err(ModuleError::NotLoaded(qualified));
        }
        tracing::info!(module = %qualified, "module unloaded");
        Ok(())
    }

    fn reload(&self, name: &str) -> Result<(), ModuleError> {
        let qualified = self.qualify(name);
        if !self.loaded_set().contains(&qualified) {
            return Err(ModuleError::NotLoaded(qualified));
        }
        tracing::info!(module = %qualified, "module reloaded");
        Ok(())
    }

    fn loaded(&self) -> Vec<String> {
        self.loaded_set().iter().cloned().collect()
    }
}
