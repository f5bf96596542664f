use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::JobsResponse;
use crate::cache::SnapshotCache;
use crate::engine::{ActionOutcome, Event, Notification};
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::models::rider::RiderProfile;
use crate::observability::metrics::Metrics;

/// Status-class filter for the processed-orders view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// In-progress orders: accepted by this rider or out for delivery.
    Accepted,
    Completed,
    Rejected,
}

impl StatusFilter {
    fn matches(self, status: OrderStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Accepted => matches!(
                status,
                OrderStatus::AcceptedByRider | OrderStatus::OutForDelivery
            ),
            StatusFilter::Completed => status == OrderStatus::Completed,
            StatusFilter::Rejected => status == OrderStatus::Rejected,
        }
    }
}

/// Rider-visible state published to the UI after every mutation.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub profile: Option<RiderProfile>,
    pub pending_offers: Vec<Order>,
    /// Filtered by `filter`, sorted descending by accepted timestamp
    /// (missing timestamps sort last).
    pub processed_orders: Vec<Order>,
    pub tips_total: f64,
    pub filter: StatusFilter,
}

/// What a push event did to local state.
#[derive(Debug, PartialEq)]
pub enum PushOutcome {
    Merged(Option<Notification>),
    /// Unseen id arriving in a status that is not valid at first sight.
    Ignored,
}

/// Exclusive owner of the two authoritative order collections. All mutation
/// goes through the methods below; the actor loop in [`run_reconciler`]
/// serializes them. Timestamps are injected so merges are deterministic under
/// test.
pub struct Reconciler {
    profile: Option<RiderProfile>,
    /// Offers not yet accepted by this rider, in arrival order.
    pending: Vec<Order>,
    /// Orders this rider accepted, keyed by id. Never removed, only filtered
    /// for display.
    processed: HashMap<OrderId, Order>,
    tips_total: f64,
    filter: StatusFilter,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::seeded(None, Vec::new())
    }

    /// Warm-start from the snapshot cache. Live data overwrites this as soon
    /// as it arrives.
    pub fn seeded(profile: Option<RiderProfile>, pending: Vec<Order>) -> Self {
        Self {
            profile,
            pending,
            processed: HashMap::new(),
            tips_total: 0.0,
            filter: StatusFilter::All,
        }
    }

    pub fn pending_offers(&self) -> &[Order] {
        &self.pending
    }

    pub fn profile(&self) -> Option<&RiderProfile> {
        self.profile.as_ref()
    }

    /// Unified merge policy for a server-pushed order event, keyed by id.
    pub fn apply_push(&mut self, incoming: Order, now: DateTime<Utc>) -> PushOutcome {
        // 1. Update to an order this rider already owns: field-level merge.
        if let Some(existing) = self.processed.get_mut(&incoming.id) {
            let was_out_for_delivery = existing.status == OrderStatus::OutForDelivery;
            existing.status = incoming.status;
            if let Some(code) = incoming.pickup_code.filter(|c| !c.is_empty()) {
                existing.pickup_code = Some(code);
            }
            // first transition into OutForDelivery starts the delivery timer;
            // a repeated push must not restart it
            if incoming.status == OrderStatus::OutForDelivery && !was_out_for_delivery {
                existing.picked_up_at = Some(now);
            }
            return PushOutcome::Merged(Some(Notification::StatusChanged {
                order_id: incoming.id,
                status: incoming.status,
            }));
        }

        // 2. Update to an offer not yet accepted by this rider.
        if let Some(pos) = self.pending.iter().position(|o| o.id == incoming.id) {
            if incoming.status == OrderStatus::Ready {
                // vendor prepared the order; keep the cached offer, flip status
                self.pending[pos].status = OrderStatus::Ready;
                return PushOutcome::Merged(Some(Notification::OfferReady(incoming.id)));
            }
            self.pending[pos] = incoming;
            return PushOutcome::Merged(None);
        }

        // 3. First sight of this id.
        if incoming.status.is_valid_first_sight() {
            let id = incoming.id;
            self.pending.push(incoming);
            return PushOutcome::Merged(Some(Notification::NewOffer(id)));
        }

        PushOutcome::Ignored
    }

    /// Idempotent union of polled available jobs into pending offers, by id.
    /// The rider's own accepted orders in the response are informational only:
    /// local processed state is authoritative once an order is accepted, so a
    /// stale poll can never revert progress. Returns the number of new offers.
    pub fn apply_poll(&mut self, jobs: JobsResponse) -> usize {
        let mut added = 0;
        for order in jobs.available_orders {
            let seen = self.processed.contains_key(&order.id)
                || self.pending.iter().any(|o| o.id == order.id);
            if !seen {
                self.pending.push(order);
                added += 1;
            }
        }
        added
    }

    /// Server confirmed accept: move the offer into processed orders.
    pub fn confirm_accept(&mut self, id: OrderId, now: DateTime<Utc>) -> Option<Notification> {
        let pos = self.pending.iter().position(|o| o.id == id)?;
        let mut order = self.pending.remove(pos);
        order.status = OrderStatus::AcceptedByRider;
        order.accepted_at = Some(now);
        self.processed.insert(id, order);
        Some(Notification::OrderAccepted(id))
    }

    /// Accept lost the race: the offer is stale, drop it. Emits the "too
    /// late" notification exactly once (a repeat is a no-op).
    pub fn reject_accept(&mut self, id: OrderId) -> Option<Notification> {
        let pos = self.pending.iter().position(|o| o.id == id)?;
        self.pending.remove(pos);
        Some(Notification::OfferTaken(id))
    }

    pub fn confirm_pickup(&mut self, id: OrderId, now: DateTime<Utc>) -> Option<Notification> {
        let order = self.processed.get_mut(&id)?;
        if order.status.is_terminal() {
            return None;
        }
        order.status = OrderStatus::OutForDelivery;
        if order.picked_up_at.is_none() {
            order.picked_up_at = Some(now);
        }
        Some(Notification::PickupVerified(id))
    }

    /// Completion records the tip and increments the ledger exactly once; a
    /// complete on a terminal order is rejected as a no-op.
    pub fn confirm_complete(
        &mut self,
        id: OrderId,
        tip: f64,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let order = self.processed.get_mut(&id)?;
        if order.status.is_terminal() {
            return None;
        }
        order.status = OrderStatus::Completed;
        order.completed_at = Some(now);
        order.tip_amount = tip;
        self.tips_total += tip;
        Some(Notification::OrderCompleted { order_id: id, tip })
    }

    pub fn confirm_abort(&mut self, id: OrderId) -> Option<Notification> {
        if let Some(pos) = self.pending.iter().position(|o| o.id == id) {
            self.pending.remove(pos);
            return Some(Notification::OrderAborted(id));
        }
        let order = self.processed.get_mut(&id)?;
        if order.status.is_terminal() {
            return None;
        }
        order.status = OrderStatus::Rejected;
        Some(Notification::OrderAborted(id))
    }

    pub fn apply_action(&mut self, outcome: ActionOutcome, now: DateTime<Utc>) -> Option<Notification> {
        match outcome {
            ActionOutcome::Accepted(id) => self.confirm_accept(id, now),
            ActionOutcome::AcceptConflict(id) => self.reject_accept(id),
            ActionOutcome::PickedUp(id) => self.confirm_pickup(id, now),
            ActionOutcome::Completed { order_id, tip } => {
                self.confirm_complete(order_id, tip, now)
            }
            ActionOutcome::Aborted(id) => self.confirm_abort(id),
        }
    }

    pub fn set_profile(&mut self, profile: RiderProfile) {
        self.profile = Some(profile);
    }

    pub fn set_availability(&mut self, available: bool) {
        if let Some(profile) = self.profile.as_mut() {
            profile.is_available = available;
        }
    }

    pub fn set_filter(&mut self, filter: StatusFilter) {
        self.filter = filter;
    }

    pub fn reset(&mut self) {
        self.profile = None;
        self.pending.clear();
        self.processed.clear();
        self.tips_total = 0.0;
        self.filter = StatusFilter::All;
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut processed: Vec<Order> = self
            .processed
            .values()
            .filter(|o| self.filter.matches(o.status))
            .cloned()
            .collect();
        // newest accepted first; orders without a timestamp sort as oldest
        processed.sort_by(|a, b| b.accepted_at.cmp(&a.accepted_at));

        Snapshot {
            profile: self.profile.clone(),
            pending_offers: self.pending.clone(),
            processed_orders: processed,
            tips_total: self.tips_total,
            filter: self.filter,
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Actor loop: single writer over the reconciler, fed by the push pump, the
/// poll results and the action coordinator through one multiplexed channel.
/// Publishes a fresh snapshot after every event and mirrors pending offers
/// and profile into the snapshot cache.
pub async fn run_reconciler(
    mut reconciler: Reconciler,
    mut events: mpsc::Receiver<Event>,
    snapshot_tx: watch::Sender<Snapshot>,
    notify_tx: mpsc::Sender<Notification>,
    cache: SnapshotCache,
    metrics: Arc<Metrics>,
) {
    info!("reconciler started");

    while let Some(event) = events.recv().await {
        let now = Utc::now();

        let (notification, pending_dirty, profile_dirty) = match event {
            Event::Push(order) => {
                let order_id = order.id;
                match reconciler.apply_push(order, now) {
                    PushOutcome::Merged(notification) => {
                        metrics.push_events_total.with_label_values(&["merged"]).inc();
                        (notification, true, false)
                    }
                    PushOutcome::Ignored => {
                        debug!(order_id, "push for unseen order in invalid status; dropped");
                        metrics.push_events_total.with_label_values(&["ignored"]).inc();
                        (None, false, false)
                    }
                }
            }
            Event::Poll(jobs) => {
                let added = reconciler.apply_poll(jobs);
                debug!(added, "poll result merged");
                (None, added > 0, false)
            }
            Event::Action(outcome) => (reconciler.apply_action(outcome, now), true, false),
            Event::ProfileLoaded(profile) => {
                reconciler.set_profile(profile);
                (None, false, true)
            }
            Event::SetAvailability(available) => {
                reconciler.set_availability(available);
                (None, false, true)
            }
            Event::SetFilter(filter) => {
                reconciler.set_filter(filter);
                (None, false, false)
            }
            Event::Reset => {
                reconciler.reset();
                (None, false, false)
            }
        };

        metrics
            .pending_offers
            .set(reconciler.pending_offers().len() as i64);

        if pending_dirty {
            if let Err(err) = cache.save_pending(reconciler.pending_offers()).await {
                warn!(error = %err, "failed to mirror pending offers to cache");
            }
        }
        if profile_dirty {
            if let Some(profile) = reconciler.profile() {
                if let Err(err) = cache.save_profile(profile).await {
                    warn!(error = %err, "failed to mirror profile to cache");
                }
            }
        }

        let _ = snapshot_tx.send(reconciler.snapshot());

        if let Some(notification) = notification {
            if notify_tx.send(notification).await.is_err() {
                debug!("notification receiver dropped");
            }
        }
    }

    info!("reconciler stopped: event channel closed");
}
