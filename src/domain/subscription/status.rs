//! Subscription status mirrored from Stripe.
//!
//! The local `premium.status` field carries exactly the wire value Stripe
//! reports, so this enum mirrors Stripe's set rather than a local lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stripe subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current.
    Active,

    /// In a free trial. Entitled like `Active`.
    Trialing,

    /// First payment has not completed yet.
    Incomplete,

    /// First payment never completed within 23 hours. Terminal.
    IncompleteExpired,

    /// Renewal payment failed, Stripe is retrying.
    PastDue,

    /// Retries exhausted, subscription left open but unpaid.
    Unpaid,

    /// Ended. Terminal.
    Canceled,

    /// Trial ended without a payment method.
    Paused,
}

impl SubscriptionStatus {
    /// All statuses, in Stripe documentation order.
    pub const ALL: [SubscriptionStatus; 8] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Trialing,
        SubscriptionStatus::Incomplete,
        SubscriptionStatus::IncompleteExpired,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Unpaid,
        SubscriptionStatus::Canceled,
        SubscriptionStatus::Paused,
    ];

    /// Statuses that block starting a new checkout for the same customer.
    pub const BLOCKING: [SubscriptionStatus; 5] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Trialing,
        SubscriptionStatus::Incomplete,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Unpaid,
    ];

    /// Returns true if this status grants premium features.
    pub fn is_entitled(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    /// Returns true unless the subscription reached a terminal state.
    pub fn is_live(&self) -> bool {
        !matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired
        )
    }

    /// Returns true if the subscription is waiting on a payment.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Incomplete
                | SubscriptionStatus::IncompleteExpired
                | SubscriptionStatus::PastDue
                | SubscriptionStatus::Unpaid
        )
    }

    /// Returns true if a subscription in this status must stop a new checkout.
    pub fn blocks_checkout(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    /// Wire representation, as Stripe spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Paused => "paused",
        }
    }

    /// Parses a Stripe wire value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
