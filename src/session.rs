use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::api::DispatchApi;
use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::engine::reconciler::{Reconciler, Snapshot, StatusFilter, run_reconciler};
use crate::engine::{ActionCoordinator, Event, Notification};
use crate::error::{ApiError, AppError};
use crate::models::order::OrderId;
use crate::models::rider::AccountStatus;
use crate::observability::metrics::Metrics;
use crate::stream::{OrderStream, decode_order};

/// Receiving ends handed to the UI layer: the observable snapshot and the
/// one-shot notification stream.
pub struct SessionStreams {
    pub snapshots: watch::Receiver<Snapshot>,
    pub notifications: mpsc::Receiver<Notification>,
}

/// Owns the whole client lifecycle: REST handle, snapshot cache, reconciler
/// actor and the optional live push stream. Created at app start, torn down
/// at logout; nothing here is process-global.
pub struct Session {
    config: Config,
    api: Arc<dyn DispatchApi>,
    cache: SnapshotCache,
    metrics: Arc<Metrics>,
    events: mpsc::Sender<Event>,
    notify: mpsc::Sender<Notification>,
    snapshots: watch::Receiver<Snapshot>,
    actions: ActionCoordinator,
    rider_id: Mutex<Option<i64>>,
    stream: tokio::sync::Mutex<Option<OrderStream>>,
}

impl Session {
    /// Seed the reconciler from the snapshot cache and spawn its actor loop.
    /// Cache faults degrade to a cold start; they are never fatal.
    pub async fn start(
        config: Config,
        api: Arc<dyn DispatchApi>,
        cache: SnapshotCache,
        metrics: Arc<Metrics>,
    ) -> (Self, SessionStreams) {
        let (profile, pending) = match cache.load().await {
            Ok(seed) => seed,
            Err(err) => {
                warn!(error = %err, "snapshot cache unreadable; starting cold");
                (None, Vec::new())
            }
        };
        let reconciler = Reconciler::seeded(profile, pending);

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer_size);
        let (notify_tx, notify_rx) = mpsc::channel(config.notification_buffer_size);
        let (snapshot_tx, snapshot_rx) = watch::channel(reconciler.snapshot());

        tokio::spawn(run_reconciler(
            reconciler,
            events_rx,
            snapshot_tx,
            notify_tx.clone(),
            cache.clone(),
            metrics.clone(),
        ));

        let actions = ActionCoordinator::new(
            api.clone(),
            events_tx.clone(),
            notify_tx.clone(),
            metrics.clone(),
        );

        let session = Self {
            config,
            api,
            cache,
            metrics,
            events: events_tx,
            notify: notify_tx,
            snapshots: snapshot_rx.clone(),
            actions,
            rider_id: Mutex::new(None),
            stream: tokio::sync::Mutex::new(None),
        };

        (
            session,
            SessionStreams {
                snapshots: snapshot_rx,
                notifications: notify_rx,
            },
        )
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), AppError> {
        let auth = self.api.login(username, password).await?;
        self.api.set_token(Some(auth.token));
        *self.rider_id.lock().expect("rider id lock poisoned") = Some(auth.id);

        let profile = match self.api.fetch_profile(auth.id).await {
            Ok(profile) => profile,
            Err(err) => {
                self.api.set_token(None);
                *self.rider_id.lock().expect("rider id lock poisoned") = None;
                return Err(err.into());
            }
        };

        if profile.forces_logout() {
            let reason = match profile.account_status {
                AccountStatus::Suspended => "your account has been suspended",
                _ => "your account is inactive",
            };
            self.force_logout(reason).await;
            return Err(AppError::AccountDisabled(reason.to_string()));
        }

        info!(rider_id = auth.id, "logged in");
        let available = profile.is_available;
        self.send(Event::ProfileLoaded(profile)).await;

        if available {
            self.go_online(auth.id).await;
        }
        Ok(())
    }

    /// Availability is the one optimistic call: the flag flips locally first
    /// and rolls back if the server rejects it. The push stream's lifetime is
    /// bound to the flag: going online starts a fresh stream plus one jobs
    /// poll, going offline cancels the stream and any pending reconnect wait.
    pub async fn set_availability(&self, available: bool) -> Result<(), AppError> {
        let rider_id = self.require_login()?;

        self.send(Event::SetAvailability(available)).await;
        if !available {
            self.stop_stream().await;
        }

        match self.api.set_availability(rider_id, available).await {
            Ok(()) => {
                if available {
                    self.go_online(rider_id).await;
                }
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                self.force_logout("session expired").await;
                Err(ApiError::Unauthorized.into())
            }
            Err(err) => {
                // roll back the optimistic flip
                self.send(Event::SetAvailability(!available)).await;
                if !available {
                    // still available after rollback, restore the stream
                    self.go_online(rider_id).await;
                }
                if let ApiError::Network(detail) = &err {
                    let _ = self
                        .notify
                        .send(Notification::NetworkError(detail.clone()))
                        .await;
                }
                Err(err.into())
            }
        }
    }

    /// One authoritative poll, merged idempotently by the reconciler. Invoked
    /// on going online and whenever the app returns to the foreground while
    /// available.
    pub async fn refresh_jobs(&self) -> Result<(), AppError> {
        let rider_id = self.require_login()?;
        match self.api.fetch_jobs(rider_id).await {
            Ok(jobs) => {
                self.send(Event::Poll(jobs)).await;
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                self.force_logout("session expired").await;
                Err(ApiError::Unauthorized.into())
            }
            Err(err) => {
                if let ApiError::Network(detail) = &err {
                    let _ = self
                        .notify
                        .send(Notification::NetworkError(detail.clone()))
                        .await;
                }
                Err(err.into())
            }
        }
    }

    pub async fn accept_order(&self, order_id: OrderId) -> Result<(), AppError> {
        self.run_action(self.actions.accept(order_id)).await
    }

    pub async fn verify_pickup(&self, order_id: OrderId, code: &str) -> Result<(), AppError> {
        self.run_action(self.actions.verify_pickup(order_id, code))
            .await
    }

    pub async fn complete_order(&self, order_id: OrderId, tip: f64) -> Result<(), AppError> {
        self.run_action(self.actions.complete(order_id, tip)).await
    }

    pub async fn abort_order(&self, order_id: OrderId) -> Result<(), AppError> {
        self.run_action(self.actions.abort(order_id)).await
    }

    pub async fn set_filter(&self, filter: StatusFilter) {
        self.send(Event::SetFilter(filter)).await;
    }

    pub async fn logout(&self) {
        self.stop_stream().await;
        self.api.set_token(None);
        *self.rider_id.lock().expect("rider id lock poisoned") = None;
        if let Err(err) = self.cache.clear().await {
            warn!(error = %err, "failed to clear snapshot cache");
        }
        self.send(Event::Reset).await;
        info!("logged out");
    }

    async fn run_action(
        &self,
        action: impl Future<Output = Result<(), ApiError>>,
    ) -> Result<(), AppError> {
        match action.await {
            Ok(()) => Ok(()),
            Err(ApiError::Unauthorized) => {
                self.force_logout("session expired").await;
                Err(ApiError::Unauthorized.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn force_logout(&self, reason: &str) {
        self.logout().await;
        let _ = self
            .notify
            .send(Notification::ForcedLogout(reason.to_string()))
            .await;
    }

    /// Starts the push stream if none is active (single-stream guard) and
    /// pumps decoded orders into the reconciler. Triggers one jobs poll.
    async fn go_online(&self, rider_id: i64) {
        {
            let mut slot = self.stream.lock().await;
            if slot.is_none() {
                let (stream, mut raw_rx) = OrderStream::spawn(
                    &self.config.ws_url,
                    rider_id,
                    self.config.reconnect_delay(),
                    self.metrics.clone(),
                );
                let events = self.events.clone();
                let metrics = self.metrics.clone();
                tokio::spawn(async move {
                    while let Some(raw) = raw_rx.recv().await {
                        match decode_order(&raw) {
                            Ok(order) => {
                                if events.send(Event::Push(order)).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "dropping malformed push message");
                                metrics
                                    .push_events_total
                                    .with_label_values(&["decode_error"])
                                    .inc();
                            }
                        }
                    }
                });
                *slot = Some(stream);
            }
        }

        if let Err(err) = self.refresh_jobs().await {
            warn!(error = %err, "initial jobs poll failed");
        }
    }

    async fn stop_stream(&self) {
        if let Some(stream) = self.stream.lock().await.take() {
            stream.close().await;
        }
    }

    fn require_login(&self) -> Result<i64, AppError> {
        self.rider_id
            .lock()
            .expect("rider id lock poisoned")
            .ok_or_else(|| AppError::Internal("not logged in".to_string()))
    }

    async fn send(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            warn!("reconciler gone; event dropped");
        }
    }
}
