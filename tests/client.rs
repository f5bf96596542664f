use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use rider_client::api::{DispatchApi, JobsResponse, LoginSession};
use rider_client::cache::SnapshotCache;
use rider_client::config::Config;
use rider_client::engine::Notification;
use rider_client::engine::reconciler::{Snapshot, StatusFilter};
use rider_client::error::{ApiError, AppError};
use rider_client::models::order::{Order, OrderId, OrderStatus};
use rider_client::models::rider::{AccountStatus, RiderProfile};
use rider_client::observability::metrics::Metrics;
use rider_client::session::Session;

const RIDER_ID: i64 = 42;

#[derive(Clone, Copy)]
enum Reply {
    Ok,
    Conflict,
    Rejected,
    Network,
    Unauthorized,
}

impl Reply {
    fn to_result(self) -> Result<(), ApiError> {
        match self {
            Reply::Ok => Ok(()),
            Reply::Conflict => Err(ApiError::Conflict),
            Reply::Rejected => Err(ApiError::Rejected("invalid otp".to_string())),
            Reply::Network => Err(ApiError::Network("connection refused".to_string())),
            Reply::Unauthorized => Err(ApiError::Unauthorized),
        }
    }
}

struct FakeApi {
    account_status: AccountStatus,
    jobs: Mutex<JobsResponse>,
    accept_reply: Mutex<Reply>,
    verify_reply: Mutex<Reply>,
    complete_reply: Mutex<Reply>,
    availability_reply: Mutex<Reply>,
}

impl FakeApi {
    fn new() -> Self {
        Self {
            account_status: AccountStatus::Active,
            jobs: Mutex::new(JobsResponse::default()),
            accept_reply: Mutex::new(Reply::Ok),
            verify_reply: Mutex::new(Reply::Ok),
            complete_reply: Mutex::new(Reply::Ok),
            availability_reply: Mutex::new(Reply::Ok),
        }
    }

    fn with_account_status(status: AccountStatus) -> Self {
        Self {
            account_status: status,
            ..Self::new()
        }
    }

    fn set_jobs(&self, jobs: JobsResponse) {
        *self.jobs.lock().unwrap() = jobs;
    }

    fn set_accept_reply(&self, reply: Reply) {
        *self.accept_reply.lock().unwrap() = reply;
    }

    fn set_verify_reply(&self, reply: Reply) {
        *self.verify_reply.lock().unwrap() = reply;
    }

    fn set_complete_reply(&self, reply: Reply) {
        *self.complete_reply.lock().unwrap() = reply;
    }

    fn set_availability_reply(&self, reply: Reply) {
        *self.availability_reply.lock().unwrap() = reply;
    }
}

#[async_trait]
impl DispatchApi for FakeApi {
    async fn login(&self, _username: &str, _password: &str) -> Result<LoginSession, ApiError> {
        Ok(LoginSession {
            token: "test-token".to_string(),
            id: RIDER_ID,
        })
    }

    async fn fetch_profile(&self, rider_id: i64) -> Result<RiderProfile, ApiError> {
        Ok(RiderProfile {
            id: rider_id,
            username: "maya".to_string(),
            name: "Maya".to_string(),
            vehicle_model: "Scooter".to_string(),
            vehicle_number: "KA-01-1234".to_string(),
            image_url: None,
            is_available: false,
            account_status: self.account_status,
        })
    }

    async fn set_availability(&self, _rider_id: i64, _available: bool) -> Result<(), ApiError> {
        self.availability_reply.lock().unwrap().to_result()
    }

    async fn fetch_jobs(&self, _rider_id: i64) -> Result<JobsResponse, ApiError> {
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn accept_order(&self, _order_id: OrderId) -> Result<(), ApiError> {
        self.accept_reply.lock().unwrap().to_result()
    }

    async fn verify_pickup(&self, _order_id: OrderId, _code: &str) -> Result<(), ApiError> {
        self.verify_reply.lock().unwrap().to_result()
    }

    async fn complete_order(&self, _order_id: OrderId, _tip: f64) -> Result<(), ApiError> {
        self.complete_reply.lock().unwrap().to_result()
    }

    async fn abort_order(&self, _order_id: OrderId) -> Result<(), ApiError> {
        Ok(())
    }
}

fn offer(id: OrderId) -> Order {
    Order {
        id,
        vendor_name: format!("Vendor {id}"),
        delivery_address: "12 Hive Lane".to_string(),
        status: OrderStatus::Accepted,
        total_amount: 250.0,
        item_count: 3,
        pickup_code: Some("1234".to_string()),
        tip_amount: 0.0,
        accepted_at: None,
        picked_up_at: None,
        completed_at: None,
    }
}

fn test_config(cache_path: PathBuf) -> Config {
    Config {
        api_base_url: "http://127.0.0.1:1".to_string(),
        // unreachable on purpose; these tests never go online with a live stream
        ws_url: "ws://127.0.0.1:1/ws/orders".to_string(),
        log_level: "info".to_string(),
        http_timeout_secs: 1,
        reconnect_delay_secs: 60,
        event_buffer_size: 64,
        notification_buffer_size: 64,
        cache_path,
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    api: Arc<FakeApi>,
    session: Session,
    snapshots: watch::Receiver<Snapshot>,
    notifications: mpsc::Receiver<Notification>,
}

async fn harness_with(api: FakeApi) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().join("cache.json"));
    let api = Arc::new(api);
    let cache = SnapshotCache::new(config.cache_path.clone());
    let metrics = Arc::new(Metrics::new());
    let (session, streams) = Session::start(config, api.clone(), cache, metrics).await;

    Harness {
        _dir: dir,
        api,
        session,
        snapshots: streams.snapshots,
        notifications: streams.notifications,
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<Snapshot>,
    check: impl Fn(&Snapshot) -> bool,
) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if check(&rx.borrow()) {
                return rx.borrow().clone();
            }
            rx.changed().await.expect("reconciler stopped");
        }
    })
    .await
    .expect("snapshot condition not reached")
}

async fn next_notification(rx: &mut mpsc::Receiver<Notification>) -> Notification {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no notification arrived")
        .expect("notification channel closed")
}

/// Drives one offer into pending state through a login + poll.
async fn harness_with_offer(id: OrderId) -> Harness {
    let api = FakeApi::new();
    api.set_jobs(JobsResponse {
        accepted_orders: Vec::new(),
        available_orders: vec![offer(id)],
    });
    let mut h = harness_with(api).await;
    h.session.login("maya", "hunter2").await.unwrap();
    h.session.refresh_jobs().await.unwrap();
    wait_for(&mut h.snapshots, |s| {
        s.pending_offers.iter().any(|o| o.id == id)
    })
    .await;
    h
}

#[tokio::test]
async fn login_loads_profile_into_snapshot() {
    let mut h = harness_with(FakeApi::new()).await;
    h.session.login("maya", "hunter2").await.unwrap();

    let snapshot = wait_for(&mut h.snapshots, |s| s.profile.is_some()).await;
    let profile = snapshot.profile.unwrap();
    assert_eq!(profile.id, RIDER_ID);
    assert!(!profile.is_available);
}

#[tokio::test]
async fn suspended_account_is_forced_out() {
    let mut h = harness_with(FakeApi::with_account_status(AccountStatus::Suspended)).await;

    let err = h.session.login("maya", "hunter2").await.unwrap_err();
    assert!(matches!(err, AppError::AccountDisabled(_)));

    let note = next_notification(&mut h.notifications).await;
    assert!(matches!(note, Notification::ForcedLogout(_)));
    assert!(h.session.snapshot().profile.is_none());
}

#[tokio::test]
async fn accept_success_moves_offer_to_processed() {
    let mut h = harness_with_offer(55).await;

    h.session.accept_order(55).await.unwrap();

    let snapshot = wait_for(&mut h.snapshots, |s| !s.processed_orders.is_empty()).await;
    assert!(snapshot.pending_offers.is_empty());
    let order = &snapshot.processed_orders[0];
    assert_eq!(order.id, 55);
    assert_eq!(order.status, OrderStatus::AcceptedByRider);
    assert!(order.accepted_at.is_some());

    let note = next_notification(&mut h.notifications).await;
    assert_eq!(note, Notification::OrderAccepted(55));
}

#[tokio::test]
async fn accept_conflict_drops_offer_and_surfaces_too_late() {
    let mut h = harness_with_offer(55).await;
    h.api.set_accept_reply(Reply::Conflict);

    let err = h.session.accept_order(55).await.unwrap_err();
    assert!(matches!(err, AppError::Api(ApiError::Conflict)));

    let snapshot = wait_for(&mut h.snapshots, |s| s.pending_offers.is_empty()).await;
    assert!(snapshot.processed_orders.is_empty());

    let note = next_notification(&mut h.notifications).await;
    assert_eq!(note, Notification::OfferTaken(55));
    // no further notification for the same conflict
    assert!(
        tokio::time::timeout(Duration::from_millis(100), h.notifications.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn accept_network_failure_leaves_state_untouched() {
    let mut h = harness_with_offer(55).await;
    h.api.set_accept_reply(Reply::Network);

    let err = h.session.accept_order(55).await.unwrap_err();
    assert!(matches!(err, AppError::Api(ApiError::Network(_))));

    let note = next_notification(&mut h.notifications).await;
    assert!(matches!(note, Notification::NetworkError(_)));

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.pending_offers.len(), 1);
    assert!(snapshot.processed_orders.is_empty());
}

#[tokio::test]
async fn invalid_pickup_code_changes_nothing() {
    let mut h = harness_with_offer(55).await;
    h.session.accept_order(55).await.unwrap();
    wait_for(&mut h.snapshots, |s| !s.processed_orders.is_empty()).await;
    next_notification(&mut h.notifications).await; // OrderAccepted

    h.api.set_verify_reply(Reply::Rejected);
    let err = h.session.verify_pickup(55, "0000").await.unwrap_err();
    assert!(matches!(err, AppError::Api(ApiError::Rejected(_))));

    let note = next_notification(&mut h.notifications).await;
    assert_eq!(note, Notification::InvalidPickupCode(55));

    let order = &h.session.snapshot().processed_orders[0];
    assert_eq!(order.status, OrderStatus::AcceptedByRider);
    assert!(order.picked_up_at.is_none());
}

#[tokio::test]
async fn full_delivery_flow_records_tip_once() {
    let mut h = harness_with_offer(55).await;

    h.session.accept_order(55).await.unwrap();
    h.session.verify_pickup(55, "1234").await.unwrap();
    h.session.complete_order(55, 20.0).await.unwrap();

    let snapshot = wait_for(&mut h.snapshots, |s| {
        s.processed_orders
            .first()
            .is_some_and(|o| o.status == OrderStatus::Completed)
    })
    .await;

    let order = &snapshot.processed_orders[0];
    assert!(order.picked_up_at.is_some());
    assert!(order.completed_at.is_some());
    assert_eq!(order.tip_amount, 20.0);
    assert_eq!(snapshot.tips_total, 20.0);
}

#[tokio::test]
async fn availability_failure_rolls_back_optimistic_flip() {
    let api = FakeApi::new();
    api.set_availability_reply(Reply::Network);
    let mut h = harness_with(api).await;
    h.session.login("maya", "hunter2").await.unwrap();
    wait_for(&mut h.snapshots, |s| s.profile.is_some()).await;

    let err = h.session.set_availability(true).await.unwrap_err();
    assert!(matches!(err, AppError::Api(ApiError::Network(_))));

    let note = next_notification(&mut h.notifications).await;
    assert!(matches!(note, Notification::NetworkError(_)));

    // a filter change acts as a barrier: once it is visible, the rollback
    // event queued before it has been applied too
    h.session.set_filter(StatusFilter::Completed).await;
    let snapshot = wait_for(&mut h.snapshots, |s| s.filter == StatusFilter::Completed).await;
    assert!(!snapshot.profile.unwrap().is_available);
}

#[tokio::test]
async fn unauthorized_action_forces_logout() {
    let mut h = harness_with_offer(55).await;
    h.api.set_accept_reply(Reply::Unauthorized);

    let err = h.session.accept_order(55).await.unwrap_err();
    assert!(matches!(err, AppError::Api(ApiError::Unauthorized)));

    let note = next_notification(&mut h.notifications).await;
    assert!(matches!(note, Notification::ForcedLogout(_)));

    let snapshot = wait_for(&mut h.snapshots, |s| s.profile.is_none()).await;
    assert!(snapshot.pending_offers.is_empty());
    assert!(snapshot.processed_orders.is_empty());
}

#[tokio::test]
async fn double_complete_is_rejected_by_reconciler() {
    let mut h = harness_with_offer(55).await;
    h.session.accept_order(55).await.unwrap();
    h.session.verify_pickup(55, "1234").await.unwrap();
    h.session.complete_order(55, 20.0).await.unwrap();

    wait_for(&mut h.snapshots, |s| s.tips_total == 20.0).await;

    // the server acks again but the reconciler must not double count
    h.session.complete_order(55, 20.0).await.unwrap();
    h.session.refresh_jobs().await.unwrap();
    wait_for(&mut h.snapshots, |s| s.tips_total == 20.0).await;
    assert_eq!(h.session.snapshot().tips_total, 20.0);
}

#[tokio::test]
async fn cache_round_trip_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SnapshotCache::new(dir.path().join("cache.json"));

    // missing file is a cold start, not an error
    let (profile, pending) = cache.load().await.unwrap();
    assert!(profile.is_none());
    assert!(pending.is_empty());

    let rider = RiderProfile {
        id: RIDER_ID,
        username: "maya".to_string(),
        name: "Maya".to_string(),
        vehicle_model: "Scooter".to_string(),
        vehicle_number: "KA-01-1234".to_string(),
        image_url: None,
        is_available: true,
        account_status: AccountStatus::Active,
    };
    cache.save_profile(&rider).await.unwrap();
    cache.save_pending(&[offer(1), offer(2)]).await.unwrap();

    let (profile, pending) = cache.load().await.unwrap();
    assert_eq!(profile.unwrap().id, RIDER_ID);
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, 1);

    cache.clear().await.unwrap();
    let (profile, pending) = cache.load().await.unwrap();
    assert!(profile.is_none());
    assert!(pending.is_empty());
}

#[tokio::test]
async fn session_seeds_from_cache_for_warm_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().join("cache.json"));
    let cache = SnapshotCache::new(config.cache_path.clone());
    cache.save_pending(&[offer(7)]).await.unwrap();

    let api = Arc::new(FakeApi::new());
    let metrics = Arc::new(Metrics::new());
    let (session, _streams) = Session::start(config, api, cache, metrics).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.pending_offers.len(), 1);
    assert_eq!(snapshot.pending_offers[0].id, 7);
}
