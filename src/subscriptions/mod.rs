mod manager;

pub use self::manager::{
    Notification, NotificationSink, SubscribeError, SubscriptionManager,
};

use bon::Builder;
use strum_macros::Display as StrumDisplay;

/// Heartbeat payload selection.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, StrumDisplay)]
pub enum HeartbeatMode {
    /// Heartbeats carry only the subscription ID and timestamp.
    #[default]
    #[strum(to_string = "empty")]
    Empty,
    /// Heartbeats carry a full snapshot of the last notified values.
    #[strum(to_string = "full")]
    Full,
}

/// Tunable subscription limits and behaviours.
#[derive(Debug, Clone, Builder)]
pub struct SubscriptionPolicy {
    /// Total subscriptions accepted per device.
    #[builder(default = 50)]
    pub max_subscriptions: usize,
    /// Attribute selection size accepted per subscription.
    #[builder(default = 100)]
    pub max_attributes_per_subscription: usize,
    #[builder(default)]
    pub heartbeat_mode: HeartbeatMode,
    /// Drop changes whose final value equals the last notified one.
    #[builder(default = true)]
    pub suppress_bounce_back: bool,
    /// Swap inverted intervals instead of rejecting them.
    #[builder(default = false)]
    pub auto_correct_intervals: bool,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn policy_defaults_match_documented_limits() {
        let policy = SubscriptionPolicy::default();
        assert_eq!(50, policy.max_subscriptions);
        assert_eq!(100, policy.max_attributes_per_subscription);
        assert_eq!(HeartbeatMode::Empty, policy.heartbeat_mode);
        assert!(policy.suppress_bounce_back);
        assert!(!policy.auto_correct_intervals);
    }
}
