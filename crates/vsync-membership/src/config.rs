//! Tunables for the membership engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vsync_sst::{RowLayout, SstError};
use vsync_view::View;

/// Which rows must report `wedged` before a successor view is installed.
///
/// Either way a node installs only once every live row has frozen on the
/// leader's committed prefix, so both policies install the same view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WedgePolicy {
    /// Wait for every live member to wedge.
    #[default]
    AllLive,
    /// Wait only for the local wedge.
    Local,
}

/// Membership engine configuration (the `[membership]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// Change log slots per row. `None` sizes the log to the member count.
    pub change_log_capacity: Option<usize>,

    /// Which rows must be wedged before installing.
    pub wedge_policy: WedgePolicy,

    /// Stop with [`MembershipError::Partitioned`](crate::MembershipError::Partitioned)
    /// once half the members have failed.
    pub require_majority: bool,

    /// Pause between polls when a driver loops on
    /// [`ViewManager::poll`](crate::ViewManager::poll).
    pub poll_interval_ms: u64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            change_log_capacity: None,
            wedge_policy: WedgePolicy::AllLive,
            require_majority: true,
            poll_interval_ms: 10,
        }
    }
}

impl MembershipConfig {
    /// Change log capacity for a group of `members`.
    pub fn capacity_for(&self, members: usize) -> usize {
        self.change_log_capacity.unwrap_or(members).max(1)
    }

    /// Row layout for the table backing `view`.
    pub fn layout_for(&self, view: &View) -> Result<RowLayout, SstError> {
        RowLayout::new(view.num_members(), self.capacity_for(view.num_members()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
