pub mod refresh;
pub mod store;

pub use refresh::{QuerySource, Refresher};
pub use store::SnapshotStore;

use std::time::Duration;

/// Refresh period; off the minute so polls don't line up with upstream scrapes.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(59);

/// Snapshots at least this old are refused.
pub const STALENESS_LIMIT: Duration = Duration::from_secs(5 * 60);
