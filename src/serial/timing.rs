use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_SETTLE_DELAY_MS: u64 = 50;
pub(crate) const DEFAULT_POLL_TIMEOUT_MS: u64 = 500;
const DEFAULT_MAX_TIMEOUTS: u32 = 5;

/// Delays applied to a single query.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Pause between writing a request and reading back the echo
    pub settle_delay: Duration,
    /// How long a single poll for readable bytes may block
    pub poll_timeout: Duration,
    /// Consecutive empty polls before a read gives up
    pub max_timeouts: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            max_timeouts: DEFAULT_MAX_TIMEOUTS,
        }
    }
}

impl Timing {
    /// Apply the overrides of a unit's timing profile.
    pub fn with_profile(&self, profile: &TimingProfile) -> Timing {
        Timing {
            settle_delay: profile
                .settle_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.settle_delay),
            poll_timeout: profile
                .poll_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.poll_timeout),
            max_timeouts: profile.max_timeouts.unwrap_or(self.max_timeouts),
        }
    }

    /// Field-wise maximum, used when several units may answer at one address.
    pub fn slowest(&self, other: &Timing) -> Timing {
        Timing {
            settle_delay: self.settle_delay.max(other.settle_delay),
            poll_timeout: self.poll_timeout.max(other.poll_timeout),
            max_timeouts: self.max_timeouts.max(other.max_timeouts),
        }
    }

    /// Worst case time spent waiting on a silent line.
    pub fn read_budget(&self) -> Duration {
        self.poll_timeout * self.max_timeouts
    }
}

/// Per control unit timing hint. Slow units (airbag modules for example) need longer delays.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeouts: Option<u32>,
}
