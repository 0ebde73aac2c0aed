//! [`HttpFaceGateway`]: the REST implementation of [`IdentificationGateway`].

use std::time::Duration;

use bytes::Bytes;
use refeitorio_core::{
  gateway::{
    Candidate, FaceHandle, GalleryId, GatewayError, IdentificationGateway,
    TrainingStatus,
  },
  worker::ExternalIdentityHandle,
};
use reqwest::{Client, RequestBuilder, Response, header::CONTENT_TYPE};
use serde::{Deserialize, de::DeserializeOwned};

use crate::wire;

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OCTET_STREAM: &str = "application/octet-stream";

/// Connection settings, from the `[gateway]` config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaceGatewayConfig {
  /// Service root, e.g. `https://<resource>.cognitiveservices.azure.com`.
  pub endpoint:          String,
  pub api_key:           String,
  pub gallery_id:        String,
  /// Display name used when the gallery has to be created.
  pub gallery_name:      String,
  pub timeout_secs:      u64,
  pub recognition_model: String,
  pub detection_model:   String,
  pub max_candidates:    u8,
}

impl Default for FaceGatewayConfig {
  fn default() -> Self {
    Self {
      endpoint:          String::new(),
      api_key:           String::new(),
      gallery_id:        "refeitorio-staff".into(),
      gallery_name:      "Cafeteria staff".into(),
      timeout_secs:      10,
      recognition_model: "recognition_04".into(),
      detection_model:   "detection_03".into(),
      max_candidates:    5,
    }
  }
}

impl FaceGatewayConfig {
  pub fn gallery(&self) -> GalleryId { GalleryId(self.gallery_id.clone()) }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

/// Async client for the face service.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpFaceGateway {
  client: Client,
  config: FaceGatewayConfig,
}

impl HttpFaceGateway {
  pub fn new(config: FaceGatewayConfig) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(config.timeout()).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/face/v1.0{}", self.config.endpoint.trim_end_matches('/'), path)
  }

  fn group_url(&self, gallery: &GalleryId, path: &str) -> String {
    self.url(&format!("/persongroups/{}{}", gallery.as_str(), path))
  }

  /// Authenticate and send `req`; non-success statuses become
  /// [`GatewayError::Rejected`].
  async fn send(&self, req: RequestBuilder) -> Result<Response, GatewayError> {
    let resp = req
      .header(KEY_HEADER, &self.config.api_key)
      .send()
      .await
      .map_err(transport_error)?;

    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GatewayError::Rejected {
      status:  status.as_u16(),
      message: wire::error_message(&body),
    })
  }

  async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, GatewayError> {
    let resp = self.send(req).await?;
    let body = resp.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(e.to_string()))
  }

  async fn create_gallery(&self, gallery: &GalleryId) -> Result<(), GatewayError> {
    let body = json_body(&wire::CreateGroup {
      name:              &self.config.gallery_name,
      recognition_model: &self.config.recognition_model,
    })?;

    self
      .send(
        self
          .client
          .put(self.group_url(gallery, ""))
          .header(CONTENT_TYPE, "application/json")
          .body(body),
      )
      .await?;
    tracing::info!(
      %gallery,
      model = %self.config.recognition_model,
      "created person group"
    );
    Ok(())
  }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
  if e.is_timeout() {
    GatewayError::Timeout
  } else {
    GatewayError::Unavailable(e.to_string())
  }
}

fn json_body<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, GatewayError> {
  serde_json::to_vec(value).map_err(|e| GatewayError::Decode(e.to_string()))
}

// ─── IdentificationGateway impl ──────────────────────────────────────────────

impl IdentificationGateway for HttpFaceGateway {
  async fn detect_face(&self, image: &[u8]) -> Result<Option<FaceHandle>, GatewayError> {
    let faces: Vec<wire::DetectedFace> = self
      .send_json(
        self
          .client
          .post(self.url("/detect"))
          .query(&[
            ("returnFaceId", "true"),
            ("recognitionModel", self.config.recognition_model.as_str()),
            ("detectionModel", self.config.detection_model.as_str()),
          ])
          .header(CONTENT_TYPE, OCTET_STREAM)
          .body(Bytes::copy_from_slice(image)),
      )
      .await?;

    if faces.len() > 1 {
      tracing::debug!(count = faces.len(), "several faces detected; using the first");
    }
    Ok(faces.into_iter().next().map(|f| FaceHandle(f.face_id)))
  }

  async fn identify(
    &self,
    face: &FaceHandle,
    gallery: &GalleryId,
  ) -> Result<Vec<Candidate>, GatewayError> {
    let body = json_body(&wire::IdentifyRequest {
      face_ids:                       [face.0.as_str()],
      person_group_id:                gallery.as_str(),
      max_num_of_candidates_returned: self.config.max_candidates,
    })?;

    let results: Vec<wire::IdentifyResult> = self
      .send_json(
        self
          .client
          .post(self.url("/identify"))
          .header(CONTENT_TYPE, "application/json")
          .body(body),
      )
      .await?;

    Ok(
      results
        .into_iter()
        .next()
        .map(|r| r.candidates.into_iter().map(Candidate::from).collect())
        .unwrap_or_default(),
    )
  }

  async fn ensure_gallery(&self, gallery: &GalleryId) -> Result<(), GatewayError> {
    match self.send(self.client.get(self.group_url(gallery, ""))).await {
      Ok(_) => Ok(()),
      Err(GatewayError::Rejected { status: 404, .. }) => {
        tracing::warn!(%gallery, "person group not found; creating it");
        self.create_gallery(gallery).await
      }
      Err(e) => Err(e),
    }
  }

  async fn train(&self, gallery: &GalleryId) -> Result<(), GatewayError> {
    self.send(self.client.post(self.group_url(gallery, "/train"))).await?;
    Ok(())
  }

  async fn training_status(&self, gallery: &GalleryId) -> Result<TrainingStatus, GatewayError> {
    let state: wire::TrainingState = self
      .send_json(self.client.get(self.group_url(gallery, "/training")))
      .await?;
    Ok(state.into_status())
  }

  async fn enroll_identity(
    &self,
    gallery: &GalleryId,
    name: &str,
  ) -> Result<ExternalIdentityHandle, GatewayError> {
    let body = json_body(&wire::CreatePerson { name })?;
    let created: wire::CreatedPerson = self
      .send_json(
        self
          .client
          .post(self.group_url(gallery, "/persons"))
          .header(CONTENT_TYPE, "application/json")
          .body(body),
      )
      .await?;
    Ok(ExternalIdentityHandle(created.person_id))
  }

  async fn attach_sample(
    &self,
    gallery: &GalleryId,
    identity: &ExternalIdentityHandle,
    image: &[u8],
  ) -> Result<(), GatewayError> {
    let path = format!("/persons/{}/persistedfaces", identity.as_str());
    self
      .send(
        self
          .client
          .post(self.group_url(gallery, &path))
          .query(&[("detectionModel", self.config.detection_model.as_str())])
          .header(CONTENT_TYPE, OCTET_STREAM)
          .body(Bytes::copy_from_slice(image)),
      )
      .await?;
    Ok(())
  }

  async fn delete_identity(
    &self,
    gallery: &GalleryId,
    identity: &ExternalIdentityHandle,
  ) -> Result<(), GatewayError> {
    let path = format!("/persons/{}", identity.as_str());
    match self.send(self.client.delete(self.group_url(gallery, &path))).await {
      Ok(_) | Err(GatewayError::Rejected { status: 404, .. }) => Ok(()),
      Err(e) => Err(e),
    }
  }
}
