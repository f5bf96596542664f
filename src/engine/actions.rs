use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::DispatchApi;
use crate::engine::{ActionOutcome, Event, Notification};
use crate::error::ApiError;
use crate::models::order::OrderId;
use crate::observability::metrics::Metrics;

/// Executes rider-initiated transitions against the backend. Local state is
/// mutated only after a definitive server response, by handing a confirmed
/// [`ActionOutcome`] to the reconciler. A timeout with unknown server-side
/// outcome is surfaced to the caller as a network error and never retried
/// here.
#[derive(Clone)]
pub struct ActionCoordinator {
    api: Arc<dyn DispatchApi>,
    events: mpsc::Sender<Event>,
    notify: mpsc::Sender<Notification>,
    metrics: Arc<Metrics>,
}

impl ActionCoordinator {
    pub fn new(
        api: Arc<dyn DispatchApi>,
        events: mpsc::Sender<Event>,
        notify: mpsc::Sender<Notification>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            api,
            events,
            notify,
            metrics,
        }
    }

    pub async fn accept(&self, order_id: OrderId) -> Result<(), ApiError> {
        match self.api.accept_order(order_id).await {
            Ok(()) => {
                self.record("accept", "success");
                info!(order_id, "accept confirmed");
                self.confirm(ActionOutcome::Accepted(order_id)).await;
                Ok(())
            }
            Err(ApiError::Conflict) => {
                // another rider won the race; the local offer is stale
                self.record("accept", "conflict");
                warn!(order_id, "accept conflict: order already taken");
                self.confirm(ActionOutcome::AcceptConflict(order_id)).await;
                Err(ApiError::Conflict)
            }
            Err(err) => {
                self.record("accept", "error");
                self.surface_transport(&err).await;
                Err(err)
            }
        }
    }

    pub async fn verify_pickup(&self, order_id: OrderId, code: &str) -> Result<(), ApiError> {
        match self.api.verify_pickup(order_id, code).await {
            Ok(()) => {
                self.record("verify_pickup", "success");
                info!(order_id, "pickup code verified");
                self.confirm(ActionOutcome::PickedUp(order_id)).await;
                Ok(())
            }
            Err(ApiError::Rejected(reason)) => {
                self.record("verify_pickup", "rejected");
                let _ = self
                    .notify
                    .send(Notification::InvalidPickupCode(order_id))
                    .await;
                Err(ApiError::Rejected(reason))
            }
            Err(err) => {
                self.record("verify_pickup", "error");
                self.surface_transport(&err).await;
                Err(err)
            }
        }
    }

    pub async fn complete(&self, order_id: OrderId, tip: f64) -> Result<(), ApiError> {
        match self.api.complete_order(order_id, tip).await {
            Ok(()) => {
                self.record("complete", "success");
                info!(order_id, tip, "completion confirmed");
                self.confirm(ActionOutcome::Completed { order_id, tip }).await;
                Ok(())
            }
            Err(err) => {
                self.record("complete", "error");
                self.surface_transport(&err).await;
                Err(err)
            }
        }
    }

    pub async fn abort(&self, order_id: OrderId) -> Result<(), ApiError> {
        match self.api.abort_order(order_id).await {
            Ok(()) => {
                self.record("abort", "success");
                info!(order_id, "abort confirmed");
                self.confirm(ActionOutcome::Aborted(order_id)).await;
                Ok(())
            }
            Err(err) => {
                self.record("abort", "error");
                self.surface_transport(&err).await;
                Err(err)
            }
        }
    }

    async fn confirm(&self, outcome: ActionOutcome) {
        if self.events.send(Event::Action(outcome)).await.is_err() {
            warn!("reconciler gone; dropping confirmed action");
        }
    }

    async fn surface_transport(&self, err: &ApiError) {
        // auth failures are handled by the session (forced logout), not here
        if let ApiError::Network(detail) = err {
            let _ = self
                .notify
                .send(Notification::NetworkError(detail.clone()))
                .await;
        }
    }

    fn record(&self, action: &str, outcome: &str) {
        self.metrics
            .actions_total
            .with_label_values(&[action, outcome])
            .inc();
    }
}
