mod scheduler;
mod tick_guard;

pub use scheduler::{DEFAULT_POLL_INTERVAL, TickOutcome, UploadScheduler};
