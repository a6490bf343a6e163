use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::detect::backend::PersonClassifier;
use crate::detect::result::{PersonBox, PersonDetection, PersonScan, PERSON_CLASS_ID};
use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StubResponse {
    NoPerson,
    Person,
    Fail,
}

/// Model-free classifier with a fixed answer.
///
/// Used when no model is deployed (motion-only mode) and in tests, where the
/// shared call counter shows whether the pipeline consulted the classifier.
pub struct StubClassifier {
    response: StubResponse,
    calls: Arc<AtomicUsize>,
}

impl StubClassifier {
    /// Never reports a person.
    pub fn new() -> Self {
        Self::with_response(StubResponse::NoPerson)
    }

    /// Reports one full-frame person on every call.
    pub fn always_person() -> Self {
        Self::with_response(StubResponse::Person)
    }

    /// Fails every call, as a broken inference engine would.
    pub fn failing() -> Self {
        Self::with_response(StubResponse::Fail)
    }

    fn with_response(response: StubResponse) -> Self {
        Self {
            response,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle to the number of `detect_person` calls made so far.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonClassifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect_person(&mut self, _frame: &Frame) -> Result<PersonScan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.response {
            StubResponse::NoPerson => Ok(PersonScan::default()),
            StubResponse::Person => Ok(PersonScan {
                people: vec![PersonDetection {
                    bbox: PersonBox::from([0.0, 0.0, 1.0, 1.0]),
                    score: 0.9,
                    class_id: PERSON_CLASS_ID,
                }],
            }),
            StubResponse::Fail => Err(anyhow!("stub classifier failure")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::from_rgb(4, 4, vec![0u8; 48]).unwrap()
    }

    #[test]
    fn stub_counts_calls() -> Result<()> {
        let mut stub = StubClassifier::new();
        let calls = stub.call_counter();

        assert!(!stub.detect_person(&frame())?.person_detected());
        assert!(!stub.detect_person(&frame())?.person_detected());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn always_person_reports_a_person() -> Result<()> {
        let mut stub = StubClassifier::always_person();
        let scan = stub.detect_person(&frame())?;
        assert_eq!(scan.people.len(), 1);
        assert_eq!(scan.people[0].class_id, PERSON_CLASS_ID);
        Ok(())
    }

    #[test]
    fn failing_stub_errors() {
        let mut stub = StubClassifier::failing();
        assert!(stub.detect_person(&frame()).is_err());
        assert_eq!(stub.call_counter().load(Ordering::SeqCst), 1);
    }
}
