pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::order::{Order, OrderId};
use crate::models::rider::RiderProfile;

pub use http::HttpApi;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginSession {
    pub token: String,
    #[serde(alias = "riderId")]
    pub id: i64,
}

/// Authoritative job listing returned by a poll: orders this rider already
/// accepted plus unclaimed offers open to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsResponse {
    #[serde(default)]
    pub accepted_orders: Vec<Order>,
    #[serde(default)]
    pub available_orders: Vec<Order>,
}

/// The dispatch backend's request/response surface. A trait so the action
/// coordinator and session can be driven by an in-memory fake in tests.
#[async_trait]
pub trait DispatchApi: Send + Sync {
    /// Install or clear the bearer token used by authenticated calls.
    fn set_token(&self, _token: Option<String>) {}

    async fn login(&self, username: &str, password: &str) -> Result<LoginSession, ApiError>;
    async fn fetch_profile(&self, rider_id: i64) -> Result<RiderProfile, ApiError>;
    async fn set_availability(&self, rider_id: i64, available: bool) -> Result<(), ApiError>;
    async fn fetch_jobs(&self, rider_id: i64) -> Result<JobsResponse, ApiError>;
    async fn accept_order(&self, order_id: OrderId) -> Result<(), ApiError>;
    async fn verify_pickup(&self, order_id: OrderId, code: &str) -> Result<(), ApiError>;
    async fn complete_order(&self, order_id: OrderId, tip: f64) -> Result<(), ApiError>;
    async fn abort_order(&self, order_id: OrderId) -> Result<(), ApiError>;
}
