use std::sync::atomic::{AtomicBool, Ordering};

/// RAII guard marking a scheduler tick as running.
///
/// Acquiring fails while another guard for the same flag is alive; dropping
/// the guard clears the flag even if the tick returned early with an error.
pub(crate) struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    /// Set the flag, or return `None` if a tick is already running.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
