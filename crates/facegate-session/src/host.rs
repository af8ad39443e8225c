//! Collaborators supplied by the host: frame capture, the face model, the
//! per-frame scheduler, overlay drawing and the status sink.

use chrono::{DateTime, Utc};
use facegate_core::{Detection, Frame, FrameSize};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Interval, MissedTickBehavior};
use uuid::Uuid;

/// Boxed `Send` future returned by the async collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera not available: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("descriptor source unavailable: {0}")]
    Unavailable(String),
    #[error("detection failed: {0}")]
    DetectionFailed(String),
}

/// Continuous frame supply (camera or video element).
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Result<Frame, CaptureError>;
}

/// Face detection + embedding model.
///
/// `Ok(None)` means no face was found in the frame. Latency is unbounded and
/// callers apply no timeout.
pub trait DescriptorSource: Send + Sync {
    /// Resolves once the models are loaded. Awaited once at session setup.
    fn ready(&self) -> BoxFuture<'_, Result<(), SourceError>>;

    fn detect_once<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> BoxFuture<'a, Result<Option<Detection>, SourceError>>;
}

/// Per-frame scheduling callback: resolves when the next display frame is due.
pub trait FrameClock: Send + Sync {
    fn next_frame(&self) -> BoxFuture<'_, ()>;
}

/// Drawing collaborator for the detection overlay.
pub trait Overlay: Send + Sync {
    fn clear_overlay(&self);

    /// Draw box and landmarks. `detection` is in `source` frame coordinates;
    /// use [`Detection::resized`] to map it onto `display`.
    fn draw_detection(&self, detection: &Detection, source: FrameSize, display: FrameSize);
}

/// Receives status events from registration and from every verification cycle.
pub trait StatusSink: Send + Sync {
    fn report(&self, event: StatusEvent);
}

/// Observable outcome of a registration attempt or verification cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// No face in the frame; nothing was compared.
    NoFaceDetected,
    RegisteredOk {
        enrollment_id: Uuid,
        label: String,
        dimensions: usize,
        registered_at: DateTime<Utc>,
    },
    Granted {
        distance: f32,
    },
    Denied {
        distance: f32,
    },
    /// The cycle could not reach a decision. The loop keeps running.
    CycleFailed {
        reason: String,
    },
}

impl StatusEvent {
    /// True for the outcomes a verification cycle produces.
    pub fn is_cycle_report(&self) -> bool {
        !matches!(self, StatusEvent::RegisteredOk { .. })
    }
}

/// Everything the session needs from its host.
#[derive(Clone)]
pub struct Collaborators {
    pub camera: Arc<dyn FrameSource>,
    pub source: Arc<dyn DescriptorSource>,
    pub clock: Arc<dyn FrameClock>,
    pub overlay: Arc<dyn Overlay>,
    pub status: Arc<dyn StatusSink>,
}

/// [`FrameClock`] paced at a fixed display refresh rate.
///
/// Missed ticks are skipped rather than replayed, so a slow detection call
/// never causes a burst of back-to-back cycles.
pub struct RefreshClock {
    period: Duration,
    interval: Mutex<Option<Interval>>,
}

impl RefreshClock {
    pub fn new(refresh_hz: u32) -> Self {
        Self {
            period: Duration::from_secs_f64(1.0 / f64::from(refresh_hz.max(1))),
            interval: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FrameClock for RefreshClock {
    fn next_frame(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut guard = self.interval.lock().await;
            // The interval needs a running runtime, so it is created on first use.
            let interval = guard.get_or_insert_with(|| {
                let mut interval = tokio::time::interval(self.period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval
            });
            interval.tick().await;
        })
    }
}

/// [`StatusSink`] that forwards events into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn report(&self, event: StatusEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("status receiver dropped; event discarded");
        }
    }
}
