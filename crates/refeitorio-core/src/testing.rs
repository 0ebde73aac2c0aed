//! An in-process [`IdentificationGateway`] for tests.
//!
//! Probe images are matched byte-for-byte against registered faces; each
//! registered face yields a fixed candidate list. Enrolled identities are
//! tracked so tests can assert on gallery contents.

use std::{
  collections::{HashMap, HashSet},
  sync::{Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use uuid::Uuid;

use crate::{
  gateway::{
    Candidate, FaceHandle, GalleryId, GatewayError, IdentificationGateway,
    TrainingStatus,
  },
  worker::ExternalIdentityHandle,
};

#[derive(Default)]
struct State {
  faces:            HashMap<Vec<u8>, FaceHandle>,
  candidates:       HashMap<FaceHandle, Vec<Candidate>>,
  galleries:        HashSet<GalleryId>,
  identities:       HashMap<ExternalIdentityHandle, (String, usize)>,
  unavailable:      bool,
  reject_samples:   bool,
  fail_deletes:     bool,
  next_identity:    Option<ExternalIdentityHandle>,
  delay:            Option<Duration>,
  training_polls:   u32,
  remaining_polls:  Option<u32>,
  detect_calls:     usize,
  identify_calls:   usize,
  train_calls:      usize,
}

#[derive(Default)]
pub struct FakeGateway {
  state: Mutex<State>,
}

impl FakeGateway {
  pub fn new() -> Self { Self::default() }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Make `image` detectable, identifying as `candidates`.
  pub fn with_face(&self, image: &[u8], candidates: Vec<Candidate>) -> FaceHandle {
    let face = FaceHandle(Uuid::new_v4().to_string());
    let mut st = self.state();
    st.faces.insert(image.to_vec(), face.clone());
    st.candidates.insert(face.clone(), candidates);
    face
  }

  /// Every call fails with `GatewayError::Unavailable` while set.
  pub fn set_unavailable(&self, unavailable: bool) { self.state().unavailable = unavailable; }

  /// `attach_sample` fails with a rejection while set.
  pub fn set_reject_samples(&self, reject: bool) { self.state().reject_samples = reject; }

  /// `delete_identity` fails with `Unavailable` while set.
  pub fn set_fail_deletes(&self, fail: bool) { self.state().fail_deletes = fail; }

  /// The next `enroll_identity` call returns `handle` instead of a fresh id.
  pub fn set_next_identity(&self, handle: impl Into<String>) {
    self.state().next_identity = Some(ExternalIdentityHandle(handle.into()));
  }

  /// Delay every detection call.
  pub fn set_delay(&self, delay: Duration) { self.state().delay = Some(delay); }

  /// Number of `Running` status polls before a training cycle succeeds.
  pub fn set_training_polls(&self, polls: u32) { self.state().training_polls = polls; }

  pub fn detect_calls(&self) -> usize { self.state().detect_calls }

  pub fn identify_calls(&self) -> usize { self.state().identify_calls }

  pub fn train_calls(&self) -> usize { self.state().train_calls }

  /// Identities currently live in the gallery.
  pub fn live_identities(&self) -> HashSet<ExternalIdentityHandle> {
    self.state().identities.keys().cloned().collect()
  }

  /// Number of samples attached to `identity`, if it is live.
  pub fn sample_count(&self, identity: &ExternalIdentityHandle) -> Option<usize> {
    self.state().identities.get(identity).map(|(_, n)| *n)
  }

  fn check(&self) -> Result<(), GatewayError> {
    if self.state().unavailable {
      Err(GatewayError::Unavailable("fake gateway offline".into()))
    } else {
      Ok(())
    }
  }
}

impl IdentificationGateway for FakeGateway {
  async fn detect_face(&self, image: &[u8]) -> Result<Option<FaceHandle>, GatewayError> {
    let delay = {
      let mut st = self.state();
      st.detect_calls += 1;
      st.delay
    };
    if let Some(d) = delay {
      tokio::time::sleep(d).await;
    }
    self.check()?;
    Ok(self.state().faces.get(image).cloned())
  }

  async fn identify(
    &self,
    face: &FaceHandle,
    _gallery: &GalleryId,
  ) -> Result<Vec<Candidate>, GatewayError> {
    self.state().identify_calls += 1;
    self.check()?;
    Ok(self.state().candidates.get(face).cloned().unwrap_or_default())
  }

  async fn ensure_gallery(&self, gallery: &GalleryId) -> Result<(), GatewayError> {
    self.check()?;
    self.state().galleries.insert(gallery.clone());
    Ok(())
  }

  async fn train(&self, _gallery: &GalleryId) -> Result<(), GatewayError> {
    self.check()?;
    let mut st = self.state();
    st.train_calls += 1;
    st.remaining_polls = Some(st.training_polls);
    Ok(())
  }

  async fn training_status(&self, _gallery: &GalleryId) -> Result<TrainingStatus, GatewayError> {
    self.check()?;
    let mut st = self.state();
    Ok(match st.remaining_polls.as_mut() {
      None => TrainingStatus::NotStarted,
      Some(0) => TrainingStatus::Succeeded,
      Some(n) => {
        *n -= 1;
        TrainingStatus::Running
      }
    })
  }

  async fn enroll_identity(
    &self,
    _gallery: &GalleryId,
    name: &str,
  ) -> Result<ExternalIdentityHandle, GatewayError> {
    self.check()?;
    let mut st = self.state();
    let handle = st
      .next_identity
      .take()
      .unwrap_or_else(|| ExternalIdentityHandle(Uuid::new_v4().to_string()));
    st.identities.insert(handle.clone(), (name.to_owned(), 0));
    Ok(handle)
  }

  async fn attach_sample(
    &self,
    _gallery: &GalleryId,
    identity: &ExternalIdentityHandle,
    _image: &[u8],
  ) -> Result<(), GatewayError> {
    self.check()?;
    let mut st = self.state();
    if st.reject_samples {
      return Err(GatewayError::Rejected {
        status:  400,
        message: "no face in enrollment photo".into(),
      });
    }
    match st.identities.get_mut(identity) {
      Some((_, n)) => {
        *n += 1;
        Ok(())
      }
      None => Err(GatewayError::Rejected { status: 404, message: "unknown identity".into() }),
    }
  }

  async fn delete_identity(
    &self,
    _gallery: &GalleryId,
    identity: &ExternalIdentityHandle,
  ) -> Result<(), GatewayError> {
    self.check()?;
    let mut st = self.state();
    if st.fail_deletes {
      return Err(GatewayError::Unavailable("delete refused".into()));
    }
    st.identities.remove(identity);
    Ok(())
  }
}
