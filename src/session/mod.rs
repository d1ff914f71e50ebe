//! Stateful half of the driver: one [`DeviceSession`] per attached pad,
//! held in a [`SessionRegistry`].
//!
//! ```text
//! attach ──► AttachProbe ──► DeviceSession ──► registry slot ──► input source
//!                                 │
//!               poll_transfer ◄───┤──► EventQueue ──► get_key / has_key
//! ```

pub mod attach;
pub mod device_session;
pub mod event_queue;
pub mod registry;
pub mod status;

pub use attach::{AttachError, AttachProbe};
pub use device_session::{DeviceSession, PollOutcome, ReadMode, SessionSettings};
pub use event_queue::{EventQueue, OverflowPolicy, PushOutcome, DEFAULT_QUEUE_CAPACITY};
pub use registry::{SessionRegistry, DEFAULT_MAX_SESSIONS};
pub use status::{SessionStats, SessionStatus, StatusReport};
