/// `reload/` — fetching mod text and deciding when to run it again
pub mod change;
pub mod scheduler;
pub mod source;

pub use change::ChangeDetector;
pub use scheduler::{normalize_interval, ReloadScheduler};
pub use source::{build_http_client, CodeSource};
