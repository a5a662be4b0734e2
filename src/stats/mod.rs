//! Bucket statistics: per-bucket cache, cross-account aggregation,
//! per-user snapshots and the global refresh

mod aggregator;
mod cache;
mod job;
mod scheduler;
mod snapshot;

pub use aggregator::{AggregateError, BucketAggregator};
pub use cache::{BucketStat, StatLookup, StatSource, StatsCache};
pub use job::{RefreshJob, RefreshJobConfig};
pub use scheduler::{RefreshError, RefreshScheduler, RefreshSummary, RunState};
pub use snapshot::{AggregatedBucketList, BucketSummary, UserRefreshCache};
