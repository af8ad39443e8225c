//! facegate-session — single-user face login session.
//!
//! Wires the signature registry and matcher from `facegate-core` to the
//! host's camera, face model, display clock, overlay and status sink, and
//! runs the continuous verification loop.
//!
//! Everything here is designed for one cooperative scheduling domain: run it
//! on a `current_thread` Tokio runtime.

pub mod config;
pub mod host;
pub mod session;
pub mod verify_loop;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, SessionConfig};
pub use host::{
    BoxFuture, CaptureError, ChannelSink, Collaborators, DescriptorSource, FrameClock, FrameSource,
    Overlay, RefreshClock, SourceError, StatusEvent, StatusSink,
};
pub use session::{Session, SessionError, SessionState};
pub use verify_loop::{LoopHandle, LoopStats, VerificationLoop};
