//! huddle-billing - subscription seat reconciliation
//!
//! Keeps a team's paid seat count consistent with its membership and with the
//! external billing provider:
//! - Seat increases are pushed to the provider when members join
//! - Seat decreases are deferred to the period boundary when members leave
//! - Webhook events are the authoritative reconciliation path
//!
//! The provider call is best-effort and crosses a trust boundary; local
//! membership state always wins over an unreachable billing call.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use huddle_storage::StoreError;

mod reconciler;
mod webhook;

pub use reconciler::SeatReconciler;
pub use webhook::{parse_webhook_event, SubscriptionSnapshot, WebhookEvent};

/// Billing service errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("billing provider error: {0}")]
    Provider(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    Payload(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Configuration for the billing integration
#[derive(Clone)]
pub struct BillingConfig {
    /// API secret key for the billing provider
    pub api_key: String,

    /// Webhook secret for signature verification (empty disables verification;
    /// development only)
    pub webhook_secret: String,

    /// Trial period in days (default: 14)
    pub trial_days: u32,
}

impl BillingConfig {
    /// Create a new billing configuration from environment variables
    pub fn from_env() -> Result<Self, BillingError> {
        Ok(Self {
            api_key: std::env::var("BILLING_API_KEY")
                .map_err(|_| BillingError::Config("BILLING_API_KEY not set".into()))?,
            webhook_secret: std::env::var("BILLING_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("BILLING_WEBHOOK_SECRET not set".into()))?,
            trial_days: match std::env::var("BILLING_TRIAL_DAYS") {
                Ok(v) => v.parse().map_err(|_| {
                    BillingError::Config(format!(
                        "Invalid BILLING_TRIAL_DAYS value '{}': expected a number",
                        v
                    ))
                })?,
                Err(_) => 14,
            },
        })
    }

    /// Create a test configuration (for development/testing)
    pub fn test() -> Self {
        Self {
            api_key: "test_api_key".into(),
            webhook_secret: "test_webhook_secret".into(),
            trial_days: 14,
        }
    }
}

/// Outbound calls to the external billing provider.
///
/// This is the trust boundary the seat reconciler crosses when membership
/// grows; implementations wrap the provider's API client.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Update the committed seat quantity on a subscription item.
    async fn update_item_quantity(
        &self,
        subscription_item_id: &str,
        quantity: i32,
    ) -> Result<(), BillingError>;
}

/// Mock billing provider for development and testing.
///
/// Records every quantity update and can be flipped into a failing mode to
/// exercise the provider-unreachable path.
#[derive(Default)]
pub struct MockBillingProvider {
    calls: Mutex<Vec<(String, i32)>>,
    failing: AtomicBool,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a provider error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Quantity updates received so far, in order.
    pub fn calls(&self) -> Vec<(String, i32)> {
        self.calls.lock().expect("mock provider lock poisoned").clone()
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn update_item_quantity(
        &self,
        subscription_item_id: &str,
        quantity: i32,
    ) -> Result<(), BillingError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BillingError::Provider("provider unreachable".into()));
        }

        self.calls
            .lock()
            .expect("mock provider lock poisoned")
            .push((subscription_item_id.to_owned(), quantity));

        info!(subscription_item_id, quantity, "mock seat quantity updated");
        Ok(())
    }
}
