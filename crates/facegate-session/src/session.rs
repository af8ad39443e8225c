//! Registration / verification state machine.
//!
//! ```text
//! Unregistered --register--> Registered --start--> Verifying --stop--> Idle
//! Idle --start--> Verifying          Idle --register--> Registered
//! any --reset--> Unregistered
//! ```
//!
//! The session owns the signature registry and the single live verification
//! loop. Granted/Denied/NoFaceDetected are observations reported through the
//! status sink; they never change the state.

use crate::config::SessionConfig;
use crate::host::{CaptureError, Collaborators, SourceError, StatusEvent};
use crate::verify_loop::{LoopHandle, VerificationLoop};
use facegate_core::{EuclideanMatcher, FrameSize, RegistryError, SignatureRegistry};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no face registered; register before starting verification")]
    NotRegistered,
    #[error("camera error: {0}")]
    Capture(#[from] CaptureError),
    #[error("descriptor source error: {0}")]
    Source(#[from] SourceError),
}

impl From<RegistryError> for SessionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotRegistered => SessionError::NotRegistered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unregistered,
    Registered,
    Verifying,
    Idle,
}

pub struct Session {
    config: SessionConfig,
    host: Collaborators,
    registry: SignatureRegistry,
    state: SessionState,
    /// Most recent loop. Kept after a stop so the next start can wait for it.
    verifier: Option<LoopHandle>,
    loops_started: u64,
}

impl Session {
    pub fn new(config: SessionConfig, host: Collaborators) -> Self {
        let registry = SignatureRegistry::new(config.label.clone());
        Self {
            config,
            host,
            registry,
            state: SessionState::Unregistered,
            verifier: None,
            loops_started: 0,
        }
    }

    /// Probe the frame source once, then wait for the descriptor source to
    /// load its models. A failure here is reported to the host and not retried.
    pub async fn setup(&self) -> Result<FrameSize, SessionError> {
        let frame = self.host.camera.current_frame()?;
        tracing::info!(
            width = frame.width,
            height = frame.height,
            display_width = self.config.display.width,
            display_height = self.config.display.height,
            "camera ready"
        );

        if let Err(err) = self.host.source.ready().await {
            tracing::error!(error = %err, "descriptor source not ready");
            return Err(err.into());
        }
        tracing::info!("descriptor source ready");
        Ok(frame.size())
    }

    pub fn current_state(&self) -> SessionState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.registry.is_registered()
    }

    /// True while verifying and the loop task is still running.
    pub fn is_verifying(&self) -> bool {
        self.state == SessionState::Verifying
            && self.verifier.as_ref().is_some_and(|v| !v.is_finished())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Capture one frame and enroll the face in it, replacing any prior
    /// enrollment. An active verification loop is restarted so that it
    /// compares against the new descriptor.
    pub async fn register(&mut self) -> Result<(), SessionError> {
        let frame = self.host.camera.current_frame()?;
        let detection = self.host.source.detect_once(&frame).await?;

        let Some(detection) = detection else {
            tracing::info!(state = ?self.state, "registration: no face in frame");
            self.host.status.report(StatusEvent::NoFaceDetected);
            return Err(SessionError::NoFaceDetected);
        };

        let enrollment = self.registry.register(detection.descriptor);
        self.host.status.report(StatusEvent::RegisteredOk {
            enrollment_id: enrollment.id,
            label: enrollment.label.clone(),
            dimensions: enrollment.descriptor.len(),
            registered_at: enrollment.registered_at,
        });

        if self.state == SessionState::Verifying {
            self.restart_verifier().await;
        } else {
            self.state = SessionState::Registered;
        }
        Ok(())
    }

    /// Start continuous verification. Any previous loop is cancelled and
    /// drained first, so exactly one loop is live afterwards.
    pub async fn start_verification(&mut self) -> Result<(), SessionError> {
        let enrollment = match self.registry.get() {
            Ok(enrollment) => enrollment,
            Err(err) => {
                tracing::warn!(state = ?self.state, "verification requested before registration");
                return Err(err.into());
            }
        };

        self.restart_verifier().await;
        self.state = SessionState::Verifying;
        tracing::info!(
            enrollment = %enrollment.id,
            loop_id = self.loops_started,
            "verification started"
        );
        Ok(())
    }

    /// Request the loop to stop. The cycle in flight, if any, still reports.
    pub fn stop_verification(&mut self) {
        if let Some(verifier) = &self.verifier {
            verifier.cancel();
        }
        if self.state == SessionState::Verifying {
            tracing::info!("verification stopped");
            self.state = SessionState::Idle;
        }
    }

    /// Stop verification, wait for the loop, forget the enrollment.
    pub async fn reset(&mut self) {
        self.drain_verifier().await;
        self.registry.clear();
        self.state = SessionState::Unregistered;
    }

    /// Stop verification and wait for the loop to finish.
    pub async fn shutdown(mut self) {
        self.drain_verifier().await;
        self.state = SessionState::Idle;
        tracing::info!(loops = self.loops_started, "session closed");
    }

    async fn restart_verifier(&mut self) {
        self.drain_verifier().await;

        self.loops_started += 1;
        let verifier = VerificationLoop::new(
            self.loops_started,
            self.host.clone(),
            self.registry.view(),
            EuclideanMatcher::new(self.config.threshold),
            self.config.display,
        );
        self.verifier = Some(verifier.spawn());
    }

    async fn drain_verifier(&mut self) {
        if let Some(previous) = self.verifier.take() {
            if let Some(stats) = previous.stop().await {
                tracing::debug!(
                    loop_id = stats.loop_id,
                    cycles = stats.cycles,
                    "previous loop drained"
                );
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(verifier) = &self.verifier {
            verifier.cancel();
        }
    }
}
