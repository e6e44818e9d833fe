//! Billing webhook parsing and signature verification.
//!
//! Incoming events carry the provider's own representation of a subscription;
//! they are passed through as full-state snapshots, never as deltas, so
//! out-of-order redelivery cannot corrupt local state.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use huddle_storage::{BillingInterval, SubscriptionStatus};

use crate::BillingError;

type HmacSha256 = Hmac<Sha256>;

/// Snapshot of a provider subscription object as delivered in a webhook.
#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    pub external_id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub product_id: String,
    pub price_id: String,
    pub item_id: String,
    pub quantity: i32,
    pub interval: BillingInterval,
    pub current_period_end: DateTime<Utc>,
}

/// Parsed billing webhook event
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    /// Subscription was created
    SubscriptionCreated { subscription: SubscriptionSnapshot },

    /// Subscription was updated (status, seats, plan, period rollover)
    SubscriptionUpdated {
        subscription: SubscriptionSnapshot,
        /// The provider's diff of fields that changed; informational only.
        previous_attributes: Option<serde_json::Value>,
    },

    /// Subscription was deleted/canceled
    SubscriptionDeleted { subscription: SubscriptionSnapshot },

    /// Unknown or unhandled event
    Unknown { event_type: String },
}

/// Parse a raw webhook payload into an event.
///
/// # Arguments
/// * `payload` - Raw webhook body
/// * `signature` - Signature header value (`t=<unix>,v1=<hex hmac>`)
/// * `webhook_secret` - Webhook endpoint secret (empty string disables
///   verification; development only)
///
/// When a secret is configured the signature is required and verified as
/// HMAC-SHA256 over `"{t}.{payload}"`; requests that fail verification are
/// rejected before the payload is parsed.
pub fn parse_webhook_event(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
) -> Result<WebhookEvent, BillingError> {
    if !webhook_secret.is_empty() {
        verify_signature(payload, signature, webhook_secret)?;
    }

    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| BillingError::Payload(e.to_string()))?;

    let event_type = value["type"]
        .as_str()
        .ok_or_else(|| BillingError::Payload("missing event type".into()))?;

    match event_type {
        "customer.subscription.created" => Ok(WebhookEvent::SubscriptionCreated {
            subscription: parse_subscription(&value["data"]["object"])?,
        }),

        "customer.subscription.updated" => Ok(WebhookEvent::SubscriptionUpdated {
            subscription: parse_subscription(&value["data"]["object"])?,
            previous_attributes: value["data"]
                .get("previous_attributes")
                .filter(|v| !v.is_null())
                .cloned(),
        }),

        "customer.subscription.deleted" => Ok(WebhookEvent::SubscriptionDeleted {
            subscription: parse_subscription(&value["data"]["object"])?,
        }),

        _ => Ok(WebhookEvent::Unknown {
            event_type: event_type.to_string(),
        }),
    }
}

fn parse_subscription(sub: &serde_json::Value) -> Result<SubscriptionSnapshot, BillingError> {
    let external_id = sub["id"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BillingError::Payload("missing subscription id".into()))?;
    let customer_id = sub["customer"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BillingError::Payload("missing customer id".into()))?;
    let current_period_end = sub["current_period_end"]
        .as_i64()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .ok_or_else(|| BillingError::Payload("missing current_period_end".into()))?;

    let item = &sub["items"]["data"][0];

    Ok(SubscriptionSnapshot {
        external_id: external_id.to_string(),
        customer_id: customer_id.to_string(),
        status: parse_subscription_status(sub["status"].as_str().unwrap_or("")),
        product_id: item["price"]["product"].as_str().unwrap_or("").to_string(),
        price_id: item["price"]["id"].as_str().unwrap_or("").to_string(),
        item_id: item["id"].as_str().unwrap_or("").to_string(),
        quantity: item["quantity"].as_i64().unwrap_or(1) as i32,
        interval: item["price"]["recurring"]["interval"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(BillingInterval::Month),
        current_period_end,
    })
}

fn parse_subscription_status(status: &str) -> SubscriptionStatus {
    status.parse().unwrap_or_else(|_| {
        // Default to Incomplete for unknown statuses to avoid granting
        // unintended access
        warn!(%status, "unknown subscription status, defaulting to incomplete");
        SubscriptionStatus::Incomplete
    })
}

/// Verify a `t=<unix>,v1=<hex>` signature header against the payload.
fn verify_signature(payload: &str, signature: &str, secret: &str) -> Result<(), BillingError> {
    if signature.is_empty() {
        // An attacker must not be able to bypass verification by omitting the
        // signature header.
        return Err(BillingError::InvalidSignature);
    }

    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in signature.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::InvalidSignature)?;
    if candidates.is_empty() {
        return Err(BillingError::InvalidSignature);
    }

    let signed_payload = format!("{}.{}", timestamp, payload);
    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| BillingError::Config("invalid webhook secret".into()))?;
        mac.update(signed_payload.as_bytes());
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(BillingError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATED_PAYLOAD: &str = r#"{
        "type": "customer.subscription.created",
        "data": {
            "object": {
                "id": "sub_123",
                "customer": "cus_456",
                "status": "trialing",
                "current_period_end": 1735689600,
                "items": {
                    "data": [
                        {
                            "id": "si_789",
                            "quantity": 5,
                            "price": {
                                "id": "price_pro_month",
                                "product": "prod_pro",
                                "recurring": {"interval": "month"}
                            }
                        }
                    ]
                }
            }
        }
    }"#;

    fn sign(payload: &str, secret: &str, timestamp: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_parse_subscription_created() {
        let event = parse_webhook_event(CREATED_PAYLOAD, "", "").unwrap();
        match event {
            WebhookEvent::SubscriptionCreated { subscription } => {
                assert_eq!(subscription.external_id, "sub_123");
                assert_eq!(subscription.customer_id, "cus_456");
                assert_eq!(subscription.item_id, "si_789");
                assert_eq!(subscription.quantity, 5);
                assert_eq!(subscription.status, SubscriptionStatus::Trialing);
                assert_eq!(subscription.product_id, "prod_pro");
                assert_eq!(subscription.price_id, "price_pro_month");
                assert_eq!(subscription.interval, BillingInterval::Month);
                assert_eq!(subscription.current_period_end.timestamp(), 1735689600);
            }
            _ => panic!("expected SubscriptionCreated event"),
        }
    }

    #[test]
    fn test_parse_updated_carries_previous_attributes() {
        let payload = r#"{
            "type": "customer.subscription.updated",
            "data": {
                "object": {
                    "id": "sub_1",
                    "customer": "cus_1",
                    "status": "active",
                    "current_period_end": 1735689600,
                    "items": {"data": [{"id": "si_1", "quantity": 2, "price": {"id": "p", "product": "pr", "recurring": {"interval": "year"}}}]}
                },
                "previous_attributes": {"status": "trialing"}
            }
        }"#;

        let event = parse_webhook_event(payload, "", "").unwrap();
        match event {
            WebhookEvent::SubscriptionUpdated {
                subscription,
                previous_attributes,
            } => {
                assert_eq!(subscription.status, SubscriptionStatus::Active);
                assert_eq!(subscription.interval, BillingInterval::Year);
                let prev = previous_attributes.unwrap();
                assert_eq!(prev["status"], "trialing");
            }
            _ => panic!("expected SubscriptionUpdated event"),
        }
    }

    #[test]
    fn test_parse_unknown_event() {
        let payload = r#"{"type": "some.unknown.event", "data": {}}"#;
        let event = parse_webhook_event(payload, "", "").unwrap();
        match event {
            WebhookEvent::Unknown { event_type } => {
                assert_eq!(event_type, "some.unknown.event");
            }
            _ => panic!("expected Unknown event"),
        }
    }

    #[test]
    fn test_unknown_status_defaults_to_incomplete() {
        let payload = CREATED_PAYLOAD.replace("trialing", "some_future_status");
        let event = parse_webhook_event(&payload, "", "").unwrap();
        match event {
            WebhookEvent::SubscriptionCreated { subscription } => {
                assert_eq!(subscription.status, SubscriptionStatus::Incomplete);
            }
            _ => panic!("expected SubscriptionCreated event"),
        }
    }

    #[test]
    fn test_missing_subscription_id_is_rejected() {
        let payload = r#"{
            "type": "customer.subscription.created",
            "data": {"object": {"customer": "cus_1", "current_period_end": 1735689600, "items": {"data": []}}}
        }"#;
        let result = parse_webhook_event(payload, "", "");
        assert!(matches!(result, Err(BillingError::Payload(_))));
    }

    #[test]
    fn test_missing_signature_with_secret_configured_is_rejected() {
        let result = parse_webhook_event(CREATED_PAYLOAD, "", "whsec_test_secret");
        assert!(matches!(result, Err(BillingError::InvalidSignature)));
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let secret = "whsec_test_secret";
        let signature = sign(CREATED_PAYLOAD, secret, "1735689600");
        let event = parse_webhook_event(CREATED_PAYLOAD, &signature, secret).unwrap();
        assert!(matches!(event, WebhookEvent::SubscriptionCreated { .. }));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let signature = sign(CREATED_PAYLOAD, "whsec_other_secret", "1735689600");
        let result = parse_webhook_event(CREATED_PAYLOAD, &signature, "whsec_test_secret");
        assert!(matches!(result, Err(BillingError::InvalidSignature)));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let secret = "whsec_test_secret";
        let signature = sign(CREATED_PAYLOAD, secret, "1735689600");
        let tampered = CREATED_PAYLOAD.replace("\"quantity\": 5", "\"quantity\": 500");
        let result = parse_webhook_event(&tampered, &signature, secret);
        assert!(matches!(result, Err(BillingError::InvalidSignature)));
    }

    #[test]
    fn test_garbled_signature_header_is_rejected() {
        let result = parse_webhook_event(CREATED_PAYLOAD, "v1=nothex", "whsec_test_secret");
        assert!(matches!(result, Err(BillingError::InvalidSignature)));
    }

    #[test]
    fn test_no_secret_skips_verification() {
        let result = parse_webhook_event(CREATED_PAYLOAD, "", "");
        assert!(result.is_ok());
    }
}
