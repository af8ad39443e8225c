//! Scripted host: replays recorded detections through a real session.
//!
//! A script is a JSON document with the detection seen at registration time
//! and one entry per verification frame (`null` where no face was found).
//! Once the script runs out, every further frame has no face.

use anyhow::{bail, Context, Result};
use facegate_core::{Detection, Frame, FrameSize};
use facegate_session::{
    BoxFuture, CaptureError, ChannelSink, Collaborators, DescriptorSource, FrameSource, Overlay,
    RefreshClock, Session, SessionConfig, SessionError, SourceError, StatusEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Deserialize)]
pub struct ReplayScript {
    /// Detection in the enrollment frame.
    pub register: Option<Detection>,
    /// One entry per verification frame.
    #[serde(default)]
    pub frames: Vec<Option<Detection>>,
    /// Size of the recorded frames.
    #[serde(default = "default_frame_size")]
    pub frame_size: FrameSize,
}

fn default_frame_size() -> FrameSize {
    FrameSize::new(480, 360)
}

impl ReplayScript {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay script {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid replay script {}", path.display()))
    }
}

/// Counts of each cycle outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub cycles: usize,
    pub granted: usize,
    pub denied: usize,
    pub no_face: usize,
    pub failed: usize,
}

impl ReplaySummary {
    fn record(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::Granted { .. } => self.granted += 1,
            StatusEvent::Denied { .. } => self.denied += 1,
            StatusEvent::NoFaceDetected => self.no_face += 1,
            StatusEvent::CycleFailed { .. } => self.failed += 1,
            StatusEvent::RegisteredOk { .. } => return,
        }
        self.cycles += 1;
    }
}

struct ReplayCamera {
    size: FrameSize,
    sequence: AtomicU64,
}

impl FrameSource for ReplayCamera {
    fn current_frame(&self) -> Result<Frame, CaptureError> {
        Ok(Frame {
            data: Vec::new(),
            width: self.size.width,
            height: self.size.height,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: std::time::Instant::now(),
        })
    }
}

struct ReplaySource {
    steps: Mutex<VecDeque<Option<Detection>>>,
}

impl ReplaySource {
    fn new(script: ReplayScript) -> Self {
        let mut steps = VecDeque::with_capacity(script.frames.len() + 1);
        steps.push_back(script.register);
        steps.extend(script.frames);
        Self {
            steps: Mutex::new(steps),
        }
    }
}

impl DescriptorSource for ReplaySource {
    fn ready(&self) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async move {
            let steps = self
                .steps
                .lock()
                .map_err(|_| SourceError::Unavailable("replay script lock poisoned".into()))?;
            tracing::debug!(steps = steps.len(), "replay script loaded");
            Ok(())
        })
    }

    fn detect_once<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> BoxFuture<'a, Result<Option<Detection>, SourceError>> {
        Box::pin(async move {
            let mut steps = self
                .steps
                .lock()
                .map_err(|_| SourceError::Unavailable("replay script lock poisoned".into()))?;
            let step = steps.pop_front().flatten();
            tracing::trace!(seq = frame.sequence, face = step.is_some(), "replayed detection");
            Ok(step)
        })
    }
}

/// Overlay that logs what would be drawn.
struct TracingOverlay;

impl Overlay for TracingOverlay {
    fn clear_overlay(&self) {
        tracing::trace!("overlay cleared");
    }

    fn draw_detection(&self, detection: &Detection, source: FrameSize, display: FrameSize) {
        let scaled = detection.resized(source, display);
        tracing::debug!(
            x = scaled.bounding_box.x,
            y = scaled.bounding_box.y,
            width = scaled.bounding_box.width,
            height = scaled.bounding_box.height,
            landmarks = scaled.landmarks.len(),
            "draw detection"
        );
    }
}

fn emit(out: &mut impl Write, event: &StatusEvent) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string(event)?)?;
    Ok(())
}

/// Register from the script's enrollment frame, then verify until `cycles`
/// reports have been produced. Events are written to `out` as JSON lines.
pub async fn run(
    script: ReplayScript,
    config: SessionConfig,
    cycles: Option<usize>,
    out: &mut impl Write,
) -> Result<ReplaySummary> {
    let cycles = cycles.unwrap_or(script.frames.len());
    let (sink, mut events) = ChannelSink::new();
    let host = Collaborators {
        camera: Arc::new(ReplayCamera {
            size: script.frame_size,
            sequence: AtomicU64::new(0),
        }),
        source: Arc::new(ReplaySource::new(script)),
        clock: Arc::new(RefreshClock::new(config.refresh_hz)),
        overlay: Arc::new(TracingOverlay),
        status: Arc::new(sink),
    };

    let mut session = Session::new(config, host);
    session.setup().await.context("session setup failed")?;

    let registered = session.register().await;
    while let Ok(event) = events.try_recv() {
        emit(out, &event)?;
    }
    match registered {
        Ok(()) => {}
        Err(SessionError::NoFaceDetected) => {
            bail!("registration failed: no face in the enrollment frame")
        }
        Err(err) => return Err(err).context("registration failed"),
    }

    let mut summary = ReplaySummary::default();
    if cycles == 0 {
        session.shutdown().await;
        return Ok(summary);
    }

    session.start_verification().await?;
    while summary.cycles < cycles {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                emit(out, &event)?;
                summary.record(&event);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    session.stop_verification();
    session.shutdown().await;
    // The cycle in flight at stop time still reports.
    while let Ok(event) = events.try_recv() {
        emit(out, &event)?;
        summary.record(&event);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"{
        "register": {
            "bounding_box": {"x": 100, "y": 80, "width": 150, "height": 180},
            "descriptor": [0.0, 0.0, 0.0, 0.0]
        },
        "frames": [
            {
                "bounding_box": {"x": 100, "y": 80, "width": 150, "height": 180},
                "descriptor": [0.3, 0.0, 0.0, 0.0]
            },
            null,
            {
                "bounding_box": {"x": 100, "y": 80, "width": 150, "height": 180},
                "descriptor": [0.6, 0.0, 0.0, 0.0]
            },
            {
                "bounding_box": {"x": 100, "y": 80, "width": 150, "height": 180},
                "descriptor": [0.0, 0.0]
            }
        ]
    }"#;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            refresh_hz: 1000,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_script_parses_with_defaults() {
        let script: ReplayScript = serde_json::from_str(SCRIPT).unwrap();
        assert!(script.register.is_some());
        assert_eq!(script.frames.len(), 4);
        assert!(script.frames[1].is_none());
        assert_eq!(script.frame_size, FrameSize::new(480, 360));
    }

    #[tokio::test]
    async fn test_replay_reports_each_frame() {
        let script: ReplayScript = serde_json::from_str(SCRIPT).unwrap();
        let mut out = Vec::new();

        let summary = run(script, fast_config(), None, &mut out).await.unwrap();
        assert!(summary.cycles >= 4);
        assert_eq!(summary.granted, 1);
        assert_eq!(summary.denied, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.no_face >= 1);

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["event"], "registered_ok");
        assert_eq!(lines[0]["dimensions"], 4);
        assert!(lines[0]["registered_at"].is_string());
        assert_eq!(lines[1]["event"], "granted");
        assert_eq!(lines[2]["event"], "no_face_detected");
        assert_eq!(lines[3]["event"], "denied");
        assert_eq!(lines[4]["event"], "cycle_failed");
    }

    #[tokio::test]
    async fn test_replay_registration_without_face() {
        let script: ReplayScript =
            serde_json::from_str(r#"{"register": null, "frames": [null]}"#).unwrap();
        let mut out = Vec::new();

        let err = run(script, fast_config(), None, &mut out).await.unwrap_err();
        assert!(err.to_string().contains("no face"));
        assert_eq!(
            String::from_utf8(out).unwrap().trim(),
            r#"{"event":"no_face_detected"}"#
        );
    }

    #[tokio::test]
    async fn test_replay_runs_past_script_end() {
        let script: ReplayScript = serde_json::from_str(SCRIPT).unwrap();
        let mut out = Vec::new();

        let summary = run(script, fast_config(), Some(6), &mut out).await.unwrap();
        assert!(summary.cycles >= 6);
        assert!(summary.no_face >= 3);
    }

    #[test]
    fn test_summary_ignores_registration() {
        let mut summary = ReplaySummary::default();
        summary.record(&StatusEvent::RegisteredOk {
            enrollment_id: Default::default(),
            label: "user".into(),
            dimensions: 128,
            registered_at: chrono::Utc::now(),
        });
        summary.record(&StatusEvent::Granted { distance: 0.1 });
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.granted, 1);
    }
}
