use anyhow::Result;

use crate::detect::result::PersonScan;
use crate::frame::Frame;

/// Person classifier backend.
///
/// Backends load their model once at construction and reuse it for every
/// call. `detect_person` takes `&mut self` because inference handles are not
/// safe to drive from several threads at once; share a backend across streams
/// through [`SharedClassifier`](crate::detect::SharedClassifier), which
/// serialises calls behind a mutex.
///
/// Implementations must not retain the frame beyond the call.
pub trait PersonClassifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Look for people in a frame already known to contain motion.
    fn detect_person(&mut self, frame: &Frame) -> Result<PersonScan>;

    /// Optional warm-up hook, run once before the first stream starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
