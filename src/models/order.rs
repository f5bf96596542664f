use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type OrderId = i64;

/// Fixed per-order charges collected in cash alongside the order total.
pub const DELIVERY_CHARGE: f64 = 30.0;
pub const SURGE_CHARGE: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    /// Offer accepted by dispatch, not yet by this rider.
    Accepted,
    /// Vendor has prepared the order; still open for a rider to claim.
    Ready,
    AcceptedByRider,
    OutForDelivery,
    Completed,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Rejected)
    }

    /// Only dispatch-accepted or vendor-ready orders may appear as a brand new
    /// offer; any other status for an unseen id is dropped by the reconciler.
    pub fn is_valid_first_sight(self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::Ready)
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Ready => "READY",
            OrderStatus::AcceptedByRider => "ACCEPTED BY RIDER",
            OrderStatus::OutForDelivery => "OUT FOR DELIVERY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "orderId")]
    pub id: OrderId,
    pub vendor_name: String,
    pub delivery_address: String,
    pub status: OrderStatus,
    pub total_amount: f64,
    #[serde(default)]
    pub item_count: u32,
    /// One-time pickup verification code; present only before pickup.
    #[serde(default, rename = "otp")]
    pub pickup_code: Option<String>,
    #[serde(default)]
    pub tip_amount: f64,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn cash_to_collect(&self) -> f64 {
        self.total_amount + DELIVERY_CHARGE + SURGE_CHARGE
    }
}
