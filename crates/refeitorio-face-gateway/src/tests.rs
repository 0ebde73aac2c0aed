//! Tests for `HttpFaceGateway` against a local stand-in of the face service.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use axum::{
  Json, Router,
  body::Bytes,
  extract::State,
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
  routing::{delete, get, post},
};
use refeitorio_core::gateway::{
  FaceHandle, GalleryId, GatewayError, IdentificationGateway, TrainingStatus,
};
use serde_json::{Value, json};

use crate::{FaceGatewayConfig, HttpFaceGateway, wire};

const KEY: &str = "secret";

#[derive(Default)]
struct Service {
  group_exists: AtomicBool,
}

type Shared = Arc<Service>;

fn authorised(headers: &HeaderMap) -> bool {
  headers
    .get("Ocp-Apim-Subscription-Key")
    .is_some_and(|v| v.as_bytes() == KEY.as_bytes())
}

fn not_found() -> impl IntoResponse {
  (
    StatusCode::NOT_FOUND,
    Json(json!({ "error": { "code": "PersonGroupNotFound", "message": "not found" } })),
  )
}

async fn detect(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
  if !authorised(&headers) {
    return (
      StatusCode::UNAUTHORIZED,
      Json(json!({ "error": { "code": "401", "message": "Access denied" } })),
    );
  }
  if body.as_ref() == b"face" {
    (StatusCode::OK, Json(json!([{ "faceId": "f-1" }])))
  } else {
    (StatusCode::OK, Json(json!([])))
  }
}

async fn identify(Json(req): Json<Value>) -> Json<Value> {
  assert_eq!(req["faceIds"][0], "f-1");
  assert_eq!(req["personGroupId"], "staff");
  Json(json!([{
    "faceId": "f-1",
    "candidates": [
      { "personId": "p-1", "confidence": 0.91 },
      { "personId": "p-2", "confidence": 0.40 }
    ]
  }]))
}

async fn get_group(State(s): State<Shared>) -> axum::response::Response {
  if s.group_exists.load(Ordering::SeqCst) {
    Json(json!({ "personGroupId": "staff" })).into_response()
  } else {
    not_found().into_response()
  }
}

async fn put_group(State(s): State<Shared>, Json(req): Json<Value>) -> StatusCode {
  assert_eq!(req["recognitionModel"], "recognition_04");
  s.group_exists.store(true, Ordering::SeqCst);
  StatusCode::OK
}

async fn training() -> &'static str { "not json" }

async fn create_person(Json(req): Json<Value>) -> Json<Value> {
  assert_eq!(req["name"], "Ana");
  Json(json!({ "personId": "p-new" }))
}

async fn slow() -> StatusCode {
  tokio::time::sleep(Duration::from_secs(3)).await;
  StatusCode::ACCEPTED
}

fn service(state: Shared) -> Router {
  Router::new()
    .route("/face/v1.0/detect", post(detect))
    .route("/face/v1.0/identify", post(identify))
    .route("/face/v1.0/persongroups/{id}", get(get_group).put(put_group))
    .route("/face/v1.0/persongroups/{id}/train", post(slow))
    .route("/face/v1.0/persongroups/{id}/training", get(training))
    .route("/face/v1.0/persongroups/{id}/persons", post(create_person))
    .route(
      "/face/v1.0/persongroups/{id}/persons/{person}",
      delete(|| async { not_found() }),
    )
    .with_state(state)
}

async fn serve(router: Router) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
  format!("http://{addr}/")
}

fn gateway(endpoint: String, api_key: &str) -> HttpFaceGateway {
  HttpFaceGateway::new(FaceGatewayConfig {
    endpoint,
    api_key: api_key.into(),
    gallery_id: "staff".into(),
    timeout_secs: 1,
    ..FaceGatewayConfig::default()
  })
  .unwrap()
}

async fn running() -> (HttpFaceGateway, Shared) {
  let state = Shared::default();
  let url = serve(service(Arc::clone(&state))).await;
  (gateway(url, KEY), state)
}

fn staff() -> GalleryId { GalleryId("staff".into()) }

// ─── Detection and identification ────────────────────────────────────────────

#[tokio::test]
async fn detect_returns_first_face() {
  let (g, _) = running().await;
  let face = g.detect_face(b"face").await.unwrap();
  assert_eq!(face, Some(FaceHandle("f-1".into())));
}

#[tokio::test]
async fn detect_without_faces_is_none() {
  let (g, _) = running().await;
  assert_eq!(g.detect_face(b"wall").await.unwrap(), None);
}

#[tokio::test]
async fn identify_maps_candidates() {
  let (g, _) = running().await;
  let candidates = g.identify(&FaceHandle("f-1".into()), &staff()).await.unwrap();
  assert_eq!(candidates.len(), 2);
  assert_eq!(candidates[0].identity.as_str(), "p-1");
  assert_eq!(candidates[0].confidence, 0.91);
}

// ─── Gallery management ──────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_gallery_creates_missing_group_once() {
  let (g, state) = running().await;
  assert!(!state.group_exists.load(Ordering::SeqCst));

  g.ensure_gallery(&staff()).await.unwrap();
  assert!(state.group_exists.load(Ordering::SeqCst));

  g.ensure_gallery(&staff()).await.unwrap();
}

#[tokio::test]
async fn enroll_identity_returns_person_id() {
  let (g, _) = running().await;
  let handle = g.enroll_identity(&staff(), "Ana").await.unwrap();
  assert_eq!(handle.as_str(), "p-new");
}

#[tokio::test]
async fn deleting_an_unknown_identity_succeeds() {
  let (g, _) = running().await;
  g.delete_identity(&staff(), &"p-gone".into()).await.unwrap();
}

// ─── Failure mapping ─────────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_key_is_rejected_with_service_message() {
  let state = Shared::default();
  let url = serve(service(state)).await;
  let g = gateway(url, "wrong");

  let err = g.detect_face(b"face").await.unwrap_err();
  assert_eq!(
    err,
    GatewayError::Rejected { status: 401, message: "401: Access denied".into() }
  );
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
  let (g, _) = running().await;
  let err = g.training_status(&staff()).await.unwrap_err();
  assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn slow_service_times_out() {
  let (g, _) = running().await;
  assert_eq!(g.train(&staff()).await.unwrap_err(), GatewayError::Timeout);
}

#[tokio::test]
async fn unreachable_service_is_unavailable() {
  let g = gateway("http://127.0.0.1:1".into(), KEY);
  let err = g.detect_face(b"face").await.unwrap_err();
  assert!(matches!(err, GatewayError::Unavailable(_)));
}

// ─── Wire helpers ────────────────────────────────────────────────────────────

#[test]
fn training_status_strings() {
  let parse = |s: &str| wire::TrainingState { status: s.into() }.into_status();
  assert_eq!(parse("notstarted"), TrainingStatus::NotStarted);
  assert_eq!(parse("running"), TrainingStatus::Running);
  assert_eq!(parse("Succeeded"), TrainingStatus::Succeeded);
  assert_eq!(parse("failed"), TrainingStatus::Failed);
  assert_eq!(parse("queued"), TrainingStatus::Running);
}

#[test]
fn error_message_falls_back_to_raw_body() {
  assert_eq!(wire::error_message("gateway exploded"), "gateway exploded");
  assert_eq!(
    wire::error_message(r#"{"error":{"message":"bad image"}}"#),
    "bad image"
  );
}
