mod paginate;
mod redact;
mod table;
mod truncate;

pub use paginate::{PaginateError, Paginator, RenderedPage};
pub use redact::{REDACTED_PLACEHOLDER, SecretRedactor};
pub use table::{DEFAULT_VALUE_CAP, Table, format_table, render_cell};
pub use truncate::{DEFAULT_MESSAGE_BUDGET, Fence, fit_to_budget, keep_tail};
