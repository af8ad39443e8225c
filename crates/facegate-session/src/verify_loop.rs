//! The live verification loop.
//!
//! One cycle per display frame: capture, detect, draw, compare, report.
//! Cancellation is cooperative and only observed between cycles, so a cycle
//! that has started always produces its report.

use crate::host::{CaptureError, Collaborators, SourceError, StatusEvent};
use facegate_core::{
    EuclideanMatcher, FrameSize, MatchError, Matcher, RegistryError, RegistryView,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Why a single cycle produced no decision.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("frame capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("descriptor source failed: {0}")]
    Source(#[from] SourceError),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("{0}")]
    Match(#[from] MatchError),
}

/// Summary returned when a loop terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub loop_id: u64,
    pub cycles: u64,
}

pub struct VerificationLoop {
    id: u64,
    host: Collaborators,
    registry: RegistryView,
    matcher: EuclideanMatcher,
    display: FrameSize,
}

impl VerificationLoop {
    pub fn new(
        id: u64,
        host: Collaborators,
        registry: RegistryView,
        matcher: EuclideanMatcher,
        display: FrameSize,
    ) -> Self {
        Self {
            id,
            host,
            registry,
            matcher,
            display,
        }
    }

    /// Start the loop on the current runtime.
    pub fn spawn(self) -> LoopHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let id = self.id;
        let task = tokio::spawn(self.run(cancel_rx));
        LoopHandle {
            id,
            cancel: cancel_tx,
            task,
        }
    }

    async fn run(self, mut cancel: watch::Receiver<bool>) -> LoopStats {
        tracing::info!(
            loop_id = self.id,
            threshold = self.matcher.threshold(),
            "verification loop started"
        );

        let mut cycles = 0u64;
        while !is_cancelled(&cancel) {
            let event = self.cycle().await;
            cycles += 1;
            self.host.status.report(event);

            // Between cycles: a cancel ends the wait for the next frame.
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {}
                _ = self.host.clock.next_frame() => {}
            }
        }

        tracing::info!(loop_id = self.id, cycles, "verification loop stopped");
        LoopStats {
            loop_id: self.id,
            cycles,
        }
    }

    /// Run one cycle and turn any failure into a `CycleFailed` report.
    pub async fn cycle(&self) -> StatusEvent {
        match self.try_cycle().await {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(loop_id = self.id, error = %err, "verification cycle failed");
                StatusEvent::CycleFailed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn try_cycle(&self) -> Result<StatusEvent, CycleError> {
        let frame = self.host.camera.current_frame()?;
        let detection = self.host.source.detect_once(&frame).await;
        self.host.overlay.clear_overlay();

        let Some(detection) = detection? else {
            tracing::debug!(loop_id = self.id, seq = frame.sequence, "no face in frame");
            return Ok(StatusEvent::NoFaceDetected);
        };

        self.host
            .overlay
            .draw_detection(&detection, frame.size(), self.display);

        // Read the registry only now, after the detection call returned, so a
        // registration that landed while we were suspended is honoured.
        let enrollment = self.registry.get()?;
        let result = self.matcher.compare(&detection.descriptor, &enrollment)?;

        tracing::debug!(
            loop_id = self.id,
            seq = frame.sequence,
            frame_age_ms = frame.age().as_millis() as u64,
            enrollment = %enrollment.id,
            distance = result.distance,
            accepted = result.accepted,
            "verification decision"
        );

        Ok(if result.accepted {
            StatusEvent::Granted {
                distance: result.distance,
            }
        } else {
            StatusEvent::Denied {
                distance: result.distance,
            }
        })
    }
}

/// A dropped handle counts as a cancel.
fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    let flag = *cancel.borrow();
    flag || cancel.has_changed().is_err()
}

/// Resolves once the flag is set or the handle is dropped.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        let flag = *cancel.borrow_and_update();
        if flag || cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Owner's handle on a running loop.
pub struct LoopHandle {
    id: u64,
    cancel: watch::Sender<bool>,
    task: JoinHandle<LoopStats>,
}

impl LoopHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Set the cancellation flag. Takes effect at the next cycle boundary.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to terminate. Blocks for as long as an in-flight
    /// detection call does.
    pub async fn join(self) -> Option<LoopStats> {
        match self.task.await {
            Ok(stats) => Some(stats),
            Err(err) => {
                tracing::warn!(loop_id = self.id, error = %err, "verification loop task failed");
                None
            }
        }
    }

    /// Cancel, then wait for the in-flight cycle to finish.
    pub async fn stop(self) -> Option<LoopStats> {
        self.cancel();
        self.join().await
    }
}
