pub mod aggregator;
pub mod timeline;

pub use aggregator::{ActivityAggregator, ActivityIngest, SessionMutation};
pub use timeline::{AppUsage, UsageTimeline, build_timeline};
