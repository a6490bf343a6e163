//! Stream publisher: per-subscriber streaming tasks behind a WebSocket route.

pub mod events;
pub mod server;
pub mod session;
pub mod task;

pub use events::{ClientCommand, DetectionPayload, ServerEvent, PERSON_ALERT_MESSAGE};
pub use server::{router, AppState};
pub use session::{FramePacket, StreamSession};
pub use task::{run_stream, StreamExit};
