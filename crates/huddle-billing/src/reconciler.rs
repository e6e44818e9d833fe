//! Subscription seat reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use huddle_core::SeatSync;
use huddle_storage::{Store, StoreError, TeamId, UpsertSubscriptionParams};

use crate::webhook::{SubscriptionSnapshot, WebhookEvent};
use crate::{BillingError, BillingProvider};

/// Keeps `current_period_seats` and the provider-side item quantity consistent
/// with membership size.
///
/// The committed quantity only grows intra-period: joins may push an increase
/// to the provider, leaves merely record the overprovisioned lag until the
/// period boundary. Webhook payloads are authoritative and overwrite whatever
/// was inferred locally.
pub struct SeatReconciler<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
}

impl<S: Store, P: BillingProvider> SeatReconciler<S, P> {
    pub fn new(store: Arc<S>, provider: Arc<P>) -> Self {
        Self { store, provider }
    }

    /// Seat-increase path, called after a membership addition has committed.
    ///
    /// Grows the committed quantity to cover live membership. The provider is
    /// updated first and local state only after that succeeds; if the provider
    /// is unreachable the increase is skipped entirely and the next webhook
    /// event restores consistency. The membership addition itself is never
    /// rolled back for billing reasons.
    pub async fn on_member_added(&self, team_id: &TeamId) -> Result<(), BillingError> {
        let Some(subscription) = self.store.get_subscription(team_id).await? else {
            return Ok(());
        };
        if !subscription.status.is_billable() {
            debug!(
                team_id = %team_id.0,
                status = %subscription.status,
                "subscription not billable, seats unchanged"
            );
            return Ok(());
        }

        let members = self.store.count_team_members(team_id).await?;
        let target = members.max(subscription.current_period_seats);
        if target <= subscription.current_period_seats {
            // A seat committed earlier this period already covers the join.
            debug!(
                team_id = %team_id.0,
                seats = subscription.current_period_seats,
                members,
                "existing seat commitment covers new member"
            );
            return Ok(());
        }

        if let Err(e) = self
            .provider
            .update_item_quantity(&subscription.external_item_id, target)
            .await
        {
            warn!(
                team_id = %team_id.0,
                subscription_id = %subscription.external_id,
                error = %e,
                "seat increase not pushed to billing provider, deferring to webhook reconciliation"
            );
            return Ok(());
        }

        self.store.set_subscription_seats(team_id, target).await?;
        info!(
            team_id = %team_id.0,
            subscription_id = %subscription.external_id,
            seats = target,
            "subscription seats increased"
        );
        Ok(())
    }

    /// Seat-decrease path, called after a membership removal has committed.
    ///
    /// Local-only: the committed quantity is not reduced until the provider
    /// re-meters at the period boundary. Overprovisioning is allowed,
    /// underprovisioning is not.
    pub async fn on_member_removed(&self, team_id: &TeamId) -> Result<(), BillingError> {
        let Some(subscription) = self.store.get_subscription(team_id).await? else {
            return Ok(());
        };

        let members = self.store.count_team_members(team_id).await?;
        if members < subscription.current_period_seats {
            debug!(
                team_id = %team_id.0,
                seats = subscription.current_period_seats,
                members,
                "seats overprovisioned until period end"
            );
        }
        Ok(())
    }

    /// Apply a parsed webhook event.
    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<(), BillingError> {
        match event {
            WebhookEvent::SubscriptionCreated { subscription } => {
                self.on_subscription_event(subscription, None).await
            }
            WebhookEvent::SubscriptionUpdated {
                subscription,
                previous_attributes,
            } => {
                self.on_subscription_event(subscription, previous_attributes.as_ref())
                    .await
            }
            WebhookEvent::SubscriptionDeleted { subscription } => {
                self.on_subscription_deleted(subscription).await
            }
            WebhookEvent::Unknown { event_type } => {
                info!(%event_type, "unhandled webhook event type");
                Ok(())
            }
        }
    }

    /// Authoritative upsert from a provider payload.
    ///
    /// The payload is a full-state snapshot: whatever the provider reports
    /// wins over locally inferred seat counts, and redelivery of the same
    /// event lands on the same row (upsert by external subscription id).
    pub async fn on_subscription_event(
        &self,
        snapshot: &SubscriptionSnapshot,
        previous_attributes: Option<&serde_json::Value>,
    ) -> Result<(), BillingError> {
        let team = match self
            .store
            .get_team_by_billing_customer(&snapshot.customer_id)
            .await
        {
            Ok(team) => team,
            Err(StoreError::NotFound) => {
                warn!(
                    customer_id = %snapshot.customer_id,
                    subscription_id = %snapshot.external_id,
                    "no team for billing customer, ignoring subscription event"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(previous) = previous_attributes {
            debug!(
                subscription_id = %snapshot.external_id,
                %previous,
                "provider-reported attribute changes"
            );
        }

        let params = UpsertSubscriptionParams {
            team_id: team.id.clone(),
            external_id: snapshot.external_id.clone(),
            external_item_id: snapshot.item_id.clone(),
            status: snapshot.status,
            product_id: snapshot.product_id.clone(),
            price_id: snapshot.price_id.clone(),
            interval: snapshot.interval,
            quantity: snapshot.quantity,
            current_period_end: snapshot.current_period_end,
        };
        self.store.upsert_subscription(&params).await?;

        info!(
            team_id = %team.id.0,
            subscription_id = %snapshot.external_id,
            status = %snapshot.status,
            seats = snapshot.quantity,
            "subscription reconciled from webhook"
        );
        Ok(())
    }

    /// Mark the local subscription canceled. Safe under redelivery and for
    /// subscriptions that were never mirrored locally.
    pub async fn on_subscription_deleted(
        &self,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<(), BillingError> {
        match self
            .store
            .mark_subscription_canceled(&snapshot.external_id)
            .await
        {
            Ok(()) => {
                info!(
                    subscription_id = %snapshot.external_id,
                    "subscription canceled, seat enforcement removed"
                );
                Ok(())
            }
            Err(StoreError::NotFound) => {
                debug!(
                    subscription_id = %snapshot.external_id,
                    "delete event for unknown subscription"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<S: Store + 'static, P: BillingProvider + 'static> SeatSync for SeatReconciler<S, P> {
    async fn on_member_added(
        &self,
        team_id: &TeamId,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        SeatReconciler::on_member_added(self, team_id)
            .await
            .map_err(Into::into)
    }

    async fn on_member_removed(
        &self,
        team_id: &TeamId,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        SeatReconciler::on_member_removed(self, team_id)
            .await
            .map_err(Into::into)
    }
}
