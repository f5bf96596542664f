use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderProfile {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub vehicle_model: String,
    pub vehicle_number: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub is_available: bool,
    #[serde(default = "default_account_status")]
    pub account_status: AccountStatus,
}

fn default_account_status() -> AccountStatus {
    AccountStatus::Active
}

impl RiderProfile {
    /// A suspended or inactive account must not hold a live session.
    pub fn forces_logout(&self) -> bool {
        self.account_status != AccountStatus::Active
    }
}
