//! Sync markers: the "since" position of each timeline, so a fetch only asks
//! for what is newer than the last successful one.

use crate::domain::{AccountId, TimelineType};

pub trait SyncMarkers: Send + Sync {
    fn since(&self, account: AccountId, timeline: TimelineType) -> Option<String>;

    fn record(&self, account: AccountId, timeline: TimelineType, marker: String);
}
