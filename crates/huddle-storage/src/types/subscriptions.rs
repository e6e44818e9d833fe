//! Subscription records mirroring the external billing provider.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TeamId;

/// Subscription status.
///
/// Mirrors the billing provider's lifecycle states verbatim; this system never
/// invents states of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Trial period (no payment required yet)
    Trialing,
    /// Active subscription
    Active,
    /// Past due (payment failed, but still in grace period)
    PastDue,
    /// Canceled (scheduled to end or ended)
    Canceled,
    /// Unpaid (payment failed, subscription suspended)
    Unpaid,
    /// Incomplete (initial payment incomplete)
    Incomplete,
    /// Initial payment never completed and the window expired
    IncompleteExpired,
    /// Collection paused by the provider
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Unpaid => "unpaid",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
        }
    }

    /// Whether seats on this subscription are currently being billed.
    pub fn is_billable(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::PastDue)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "unpaid" => Ok(Self::Unpaid),
            "incomplete" => Ok(Self::Incomplete),
            "incomplete_expired" => Ok(Self::IncompleteExpired),
            "paused" => Ok(Self::Paused),
            _ => Err(format!("unknown subscription status: {}", s)),
        }
    }
}

/// Billing interval for a subscription price
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl FromStr for BillingInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            _ => Err(format!("unknown billing interval: {}", s)),
        }
    }
}

/// Subscription record, one-to-one with a team (a team may be unsubscribed).
#[derive(Clone, Debug)]
pub struct Subscription {
    pub team_id: TeamId,
    /// External subscription id (unique; webhook upserts key on it).
    pub external_id: String,
    /// External subscription-item id (seat quantity lives on the item).
    pub external_item_id: String,
    pub status: SubscriptionStatus,
    pub product_id: String,
    pub price_id: String,
    pub interval: BillingInterval,
    /// Committed seat quantity on the provider side.
    pub quantity: i32,
    /// Seats billed for the current period. Never decreases mid-period;
    /// removals leave the team overprovisioned until the period boundary.
    pub current_period_seats: i32,
    pub current_period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for upserting a subscription from a provider payload
#[derive(Clone, Debug)]
pub struct UpsertSubscriptionParams {
    pub team_id: TeamId,
    pub external_id: String,
    pub external_item_id: String,
    pub status: SubscriptionStatus,
    pub product_id: String,
    pub price_id: String,
    pub interval: BillingInterval,
    pub quantity: i32,
    pub current_period_end: DateTime<Utc>,
}
