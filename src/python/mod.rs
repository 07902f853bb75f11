mod bindings;
mod sandbox;

pub use bindings::{ConsoleView, EvalBindings, HostState};
pub use sandbox::{EMPTY_RESULT_PLACEHOLDER, EvalError, EvalOutcome, EvalSandbox, strip_code_fence};
