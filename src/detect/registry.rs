use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::config::{ClassifierKind, DetectionSettings};
use crate::detect::result::PersonScan;
use crate::frame::Frame;

use super::backend::PersonClassifier;
use super::backends::StubClassifier;

/// Person classifier handle that can be shared across streams.
///
/// The backend is wrapped in a `Mutex` because `PersonClassifier::detect_person`
/// takes `&mut self`; concurrent streams queue on the lock instead of driving
/// one inference handle from several threads.
#[derive(Clone)]
pub struct SharedClassifier {
    name: &'static str,
    inner: Arc<Mutex<dyn PersonClassifier>>,
}

impl SharedClassifier {
    pub fn new<C: PersonClassifier + 'static>(classifier: C) -> Self {
        Self {
            name: classifier.name(),
            inner: Arc::new(Mutex::new(classifier)),
        }
    }

    /// Backend identifier.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn detect_person(&self, frame: &Frame) -> Result<PersonScan> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("person classifier lock poisoned"))?;
        guard.detect_person(frame)
    }

    pub fn warm_up(&self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("person classifier lock poisoned"))?;
        guard.warm_up()
    }
}

/// Construct the configured classifier and warm it up.
///
/// Failure here is fatal: no stream may start without a working classifier.
pub fn build_classifier(settings: &DetectionSettings) -> Result<SharedClassifier> {
    let shared = match settings.classifier {
        ClassifierKind::Stub => {
            log::warn!("person classifier disabled (stub); motion-only verdicts");
            SharedClassifier::new(StubClassifier::new())
        }
        ClassifierKind::Tract => build_tract(settings)?,
    };
    shared.warm_up()?;
    log::info!("person classifier ready: {}", shared.name());
    Ok(shared)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectionSettings) -> Result<SharedClassifier> {
    let classifier = super::backends::TractPersonClassifier::new(
        &settings.model_path,
        settings.model_width,
        settings.model_height,
    )?
    .with_threshold(settings.person_threshold);
    Ok(SharedClassifier::new(classifier))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectionSettings) -> Result<SharedClassifier> {
    Err(anyhow!(
        "the tract person classifier requires the backend-tract feature"
    ))
}
