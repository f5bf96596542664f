use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::api::{DispatchApi, JobsResponse, LoginSession};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::order::OrderId;
use crate::models::rider::RiderProfile;

/// reqwest-backed implementation of [`DispatchApi`]. The bearer token is set
/// after login and cleared at logout; all other calls attach it.
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpApi {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|err| ApiError::Network(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    fn auth_header(&self) -> Option<String> {
        self.token
            .read()
            .expect("token lock poisoned")
            .as_ref()
            .map(|t| format!("Bearer {t}"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let mut request = self.client.get(self.url(path));
        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        Self::read_json(request.send().await?).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let mut request = self.client.request(method, self.url(path)).json(body);
        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        Self::check_status(request.send().await?).await
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::error_for_status(response).await?;
        response.json().await.map_err(Into::into)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::error_for_status(response).await.map(|_| ())
    }

    /// Single choke point mapping HTTP statuses onto the error taxonomy.
    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::CONFLICT => Err(ApiError::Conflict),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(ApiError::Rejected(body))
            }
            _ => Err(ApiError::Network(format!("{status}: {body}"))),
        }
    }
}

#[async_trait]
impl DispatchApi for HttpApi {
    fn set_token(&self, token: Option<String>) {
        *self.token.write().expect("token lock poisoned") = token;
    }

    async fn login(&self, username: &str, password: &str) -> Result<LoginSession, ApiError> {
        let request = self
            .client
            .post(self.url("api/auth/rider/login"))
            .json(&json!({ "username": username, "password": password }));
        Self::read_json(request.send().await?).await
    }

    async fn fetch_profile(&self, rider_id: i64) -> Result<RiderProfile, ApiError> {
        self.get(&format!("api/riders/{rider_id}/profile")).await
    }

    async fn set_availability(&self, rider_id: i64, available: bool) -> Result<(), ApiError> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("api/riders/{rider_id}/availability"),
            &json!({ "isAvailable": available }),
        )
        .await
    }

    async fn fetch_jobs(&self, rider_id: i64) -> Result<JobsResponse, ApiError> {
        self.get(&format!("api/riders/{rider_id}/jobs")).await
    }

    async fn accept_order(&self, order_id: OrderId) -> Result<(), ApiError> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("api/orders/{order_id}/accept-by-rider"),
            &json!({}),
        )
        .await
    }

    async fn verify_pickup(&self, order_id: OrderId, code: &str) -> Result<(), ApiError> {
        self.send_json(
            reqwest::Method::POST,
            &format!("api/orders/{order_id}/verify-otp"),
            &json!({ "otp": code }),
        )
        .await
    }

    async fn complete_order(&self, order_id: OrderId, tip: f64) -> Result<(), ApiError> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("api/orders/{order_id}/complete-by-rider"),
            &json!({ "tip": tip }),
        )
        .await
    }

    async fn abort_order(&self, order_id: OrderId) -> Result<(), ApiError> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("api/orders/{order_id}/abort-by-rider"),
            &json!({}),
        )
        .await
    }
}
