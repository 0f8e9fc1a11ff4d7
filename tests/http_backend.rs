//! HTTP backend tests against a local axum server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use floto::api::{
    Backend, CheckRequest, CreateJobRequest, DeviceRef, HttpBackend, RetryPolicy, TimingRef,
};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Recorder {
    hits: Arc<AtomicUsize>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/")
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1))
}

fn check_request() -> CheckRequest {
    CheckRequest {
        devices: vec![DeviceRef {
            device_uuid: "dev-1".into(),
        }],
        timings: vec![TimingRef {
            timing: "type=on_demand,days=0,hours=1,minutes=0".into(),
        }],
        application: Some("app-1".into()),
    }
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/api/devices/",
            get(|State(rec): State<Recorder>| async move {
                if rec.hits.fetch_add(1, Ordering::SeqCst) < 2 {
                    (StatusCode::INTERNAL_SERVER_ERROR, "try again").into_response()
                } else {
                    Json(json!([
                        {"uuid": "dev-1", "device_name": "node-1", "is_ready": true, "peripherals": []}
                    ]))
                    .into_response()
                }
            }),
        )
        .with_state(recorder.clone());
    let backend = HttpBackend::new(serve(router).await, None, fast_retry(4)).unwrap();

    let devices = backend.list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_name, "node-1");
    assert_eq!(recorder.hits(), 3);
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/api/jobs/",
            get(|State(rec): State<Recorder>| async move {
                rec.hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE
            }),
        )
        .with_state(recorder.clone());
    let backend = HttpBackend::new(serve(router).await, None, fast_retry(3)).unwrap();

    let err = backend.list_jobs().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(recorder.hits(), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/api/applications/",
            get(|State(rec): State<Recorder>| async move {
                rec.hits.fetch_add(1, Ordering::SeqCst);
                (StatusCode::FORBIDDEN, r#"{"detail": "nope"}"#)
            }),
        )
        .with_state(recorder.clone());
    let backend = HttpBackend::new(serve(router).await, None, fast_retry(4)).unwrap();

    let err = backend.list_applications().await.unwrap_err();
    assert!(err.is_forbidden());
    assert!(!err.is_retryable());
    assert_eq!(recorder.hits(), 1);
}

#[tokio::test]
async fn test_token_sent_in_authorization_header() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/api/services/",
            get(|State(rec): State<Recorder>, headers: HeaderMap| async move {
                let auth = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                rec.auth.lock().unwrap().push(auth);
                Json(json!([]))
            }),
        )
        .with_state(recorder.clone());
    let url = serve(router).await;

    let with_token = HttpBackend::new(url.clone(), Some("s3cret".into()), fast_retry(1)).unwrap();
    with_token.list_services().await.unwrap();
    let anonymous = HttpBackend::new(url, None, fast_retry(1)).unwrap();
    anonymous.list_services().await.unwrap();

    assert_eq!(
        *recorder.auth.lock().unwrap(),
        vec![Some("Token s3cret".to_string()), None]
    );
}

#[tokio::test]
async fn test_conflict_check_round_trip() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/api/jobs/check/",
            post(|State(rec): State<Recorder>, Json(body): Json<Value>| async move {
                rec.hits.fetch_add(1, Ordering::SeqCst);
                rec.bodies.lock().unwrap().push(body);
                Json(json!({
                    "conflicts": {
                        "dev-1": [{"start": "2024-05-01T10:00:00", "stop": "2024-05-01T12:00:00"}]
                    },
                    "timeslots": {
                        "type=on_demand,days=0,hours=1,minutes=0": [
                            {"start": "2024-05-01T09:30:00Z", "stop": "2024-05-01T10:30:00Z"}
                        ]
                    }
                }))
            }),
        )
        .with_state(recorder.clone());
    let backend = HttpBackend::new(serve(router).await, None, fast_retry(4)).unwrap();

    let result = backend.check_job(&check_request()).await.unwrap();
    assert!(result.has_conflicts());
    assert_eq!(result.conflicting_devices(), vec!["dev-1"]);
    assert_eq!(
        result.conflicts["dev-1"][0].start.to_rfc3339(),
        "2024-05-01T10:00:00+00:00"
    );

    assert_eq!(
        recorder.bodies.lock().unwrap()[0],
        json!({
            "devices": [{"device_uuid": "dev-1"}],
            "timings": [{"timing": "type=on_demand,days=0,hours=1,minutes=0"}],
            "application": "app-1"
        })
    );
}

#[tokio::test]
async fn test_writes_are_sent_once() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/api/jobs/",
            post(|State(rec): State<Recorder>, Json(body): Json<Value>| async move {
                rec.hits.fetch_add(1, Ordering::SeqCst);
                rec.bodies.lock().unwrap().push(body);
                StatusCode::BAD_GATEWAY
            }),
        )
        .with_state(recorder.clone());
    let backend = HttpBackend::new(serve(router).await, None, fast_retry(4)).unwrap();

    let request = CreateJobRequest {
        is_public: true,
        application: "app-1".into(),
        environment: r#"{"RATE":"10"}"#.into(),
        devices: vec![],
        timings: vec![],
        created_by_project: Some("proj-1".into()),
    };
    let err = backend.create_job(&request).await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert_eq!(recorder.hits(), 1);
    assert_eq!(recorder.bodies.lock().unwrap()[0]["created_by_project"], "proj-1");
}

#[tokio::test]
async fn test_create_job_decodes_created_job() {
    let router = Router::new().route(
        "/api/jobs/",
        post(|Json(body): Json<Value>| async move {
            (
                StatusCode::CREATED,
                Json(json!({
                    "uuid": "job-9",
                    "application": body["application"],
                    "environment": body["environment"],
                    "devices": body["devices"],
                    "timings": body["timings"],
                    "created_by": "me@example.org"
                })),
            )
        }),
    );
    let backend = HttpBackend::new(serve(router).await, None, fast_retry(1)).unwrap();

    let request = CreateJobRequest {
        is_public: false,
        application: "app-1".into(),
        environment: "{}".into(),
        devices: check_request().devices,
        timings: check_request().timings,
        created_by_project: None,
    };
    let job = backend.create_job(&request).await.unwrap();
    assert_eq!(job.uuid, "job-9");
    assert_eq!(job.devices, request.devices);
    assert_eq!(job.created_by.as_deref(), Some("me@example.org"));
}

#[tokio::test]
async fn test_delete_treats_missing_job_as_deleted() {
    let router = Router::new().route(
        "/api/jobs/{uuid}",
        delete(|Path(uuid): Path<String>| async move {
            match uuid.as_str() {
                "gone" => StatusCode::NOT_FOUND,
                "locked" => StatusCode::FORBIDDEN,
                _ => StatusCode::NO_CONTENT,
            }
        }),
    );
    let backend = HttpBackend::new(serve(router).await, None, fast_retry(1)).unwrap();

    backend.delete_job("job-1").await.unwrap();
    backend.delete_job("gone").await.unwrap();
    let err = backend.delete_job("locked").await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_undecodable_body_is_reported() {
    let router = Router::new().route("/api/collections/", get(|| async { "<html>login</html>" }));
    let backend = HttpBackend::new(serve(router).await, None, fast_retry(4)).unwrap();

    let err = backend.list_collections().await.unwrap_err();
    assert!(err.to_string().contains("failed to decode"));
    assert!(err.status().is_none());
}
