mod scheduler;

pub use scheduler::{
    CleanupScheduler, CleanupSettings, DEFAULT_CANCEL_GRACE, DEFAULT_CLEANUP_INTERVAL,
    RecoveryReport, SweepReport,
};
