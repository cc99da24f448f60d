mod aggregator;

#[cfg(test)]
pub(crate) use aggregator::percent;

pub use aggregator::{DEFAULT_COMPLETED_RETENTION, ProgressAggregator};
