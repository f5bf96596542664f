pub mod actions;
pub mod reconciler;

use crate::api::JobsResponse;
use crate::models::order::{OrderId, OrderStatus};
use crate::models::rider::RiderProfile;

pub use actions::ActionCoordinator;
pub use reconciler::{Reconciler, Snapshot, StatusFilter};

/// A confirmed rider action. Produced by the action coordinator strictly
/// after a success (or conflict) response from the backend; applied by the
/// reconciler outside the push-merge path.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Accepted(OrderId),
    /// Another rider claimed the order first.
    AcceptConflict(OrderId),
    PickedUp(OrderId),
    Completed { order_id: OrderId, tip: f64 },
    Aborted(OrderId),
}

/// Everything that can mutate reconciler state, multiplexed onto one channel
/// so merges apply one at a time in receipt order.
#[derive(Debug, Clone)]
pub enum Event {
    Push(crate::models::order::Order),
    Poll(JobsResponse),
    Action(ActionOutcome),
    ProfileLoaded(RiderProfile),
    SetAvailability(bool),
    SetFilter(StatusFilter),
    Reset,
}

/// One-shot, user-visible events (toast-style). Not part of the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NewOffer(OrderId),
    OfferReady(OrderId),
    StatusChanged { order_id: OrderId, status: OrderStatus },
    OrderAccepted(OrderId),
    /// Accept raced with another rider and lost.
    OfferTaken(OrderId),
    PickupVerified(OrderId),
    OrderCompleted { order_id: OrderId, tip: f64 },
    OrderAborted(OrderId),
    InvalidPickupCode(OrderId),
    NetworkError(String),
    ForcedLogout(String),
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Notification::NewOffer(id) => format!("New order #{id} is now available!"),
            Notification::OfferReady(id) => format!("Order #{id} is ready for pickup!"),
            Notification::StatusChanged { order_id, status } => {
                format!("Order #{order_id} status updated to {}", status.label())
            }
            Notification::OrderAccepted(id) => {
                format!("Order #{id} accepted! Proceed to vendor for pickup.")
            }
            Notification::OfferTaken(id) => {
                format!("Too late! Order #{id} was taken by another rider.")
            }
            Notification::PickupVerified(id) => {
                format!("Pickup verified for order #{id}. Delivery started.")
            }
            Notification::OrderCompleted { order_id, .. } => {
                format!("Order #{order_id} completed!")
            }
            Notification::OrderAborted(id) => format!("Order #{id} aborted."),
            Notification::InvalidPickupCode(id) => {
                format!("Invalid pickup code for order #{id}. Please try again.")
            }
            Notification::NetworkError(detail) => format!("Network error: {detail}"),
            Notification::ForcedLogout(reason) => format!("Logged out: {reason}"),
        }
    }
}
