//! In-memory collaborators for unit tests.

use crate::host::{
    BoxFuture, CaptureError, ChannelSink, Collaborators, DescriptorSource, FrameClock, FrameSource,
    Overlay, SourceError, StatusEvent,
};
use facegate_core::{BoundingBox, Descriptor, Detection, Frame, FrameSize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

pub const FRAME_SIZE: FrameSize = FrameSize { width: 480, height: 360 };

pub const FACE_BOX: BoundingBox = BoundingBox {
    x: 100.0,
    y: 80.0,
    width: 150.0,
    height: 180.0,
    confidence: 0.97,
};

/// 128-dim descriptor at `offset` along the first axis from the origin.
pub fn descriptor(offset: f32) -> Descriptor {
    let mut values = vec![0.0f32; 128];
    values[0] = offset;
    Descriptor::new(values)
}

#[derive(Default)]
pub struct FakeCamera {
    failing: AtomicBool,
    sequence: AtomicU64,
}

impl FakeCamera {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl FrameSource for FakeCamera {
    fn current_frame(&self) -> Result<Frame, CaptureError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceNotFound("/dev/video0".into()));
        }
        Ok(Frame {
            data: Vec::new(),
            width: FRAME_SIZE.width,
            height: FRAME_SIZE.height,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp: std::time::Instant::now(),
        })
    }
}

/// Descriptor source that reports whatever face is currently "in front of the camera".
///
/// Optionally gated: each detection call then waits for a permit, which lets
/// a test hold a call in flight.
pub struct Scene {
    face: Mutex<Option<Descriptor>>,
    failing: AtomicBool,
    gate: Option<Semaphore>,
    yields: usize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Scene {
    fn with(gate: Option<Semaphore>, yields: usize) -> Self {
        Self {
            face: Mutex::new(None),
            failing: AtomicBool::new(false),
            gate,
            yields,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn show(&self, face: Descriptor) {
        *self.face.lock().unwrap() = Some(face);
    }

    pub fn hide(&self) {
        *self.face.lock().unwrap() = None;
    }

    /// While failing, the models report as not loaded.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("models not loaded".into()));
        }
        Ok(())
    }

    /// Let `n` gated detection calls complete.
    pub fn release(&self, n: usize) {
        self.gate.as_ref().expect("scene is not gated").add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Wait until `n` detection calls are suspended.
    pub async fn wait_in_flight(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.in_flight() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("detection call never started");
    }
}

impl DescriptorSource for Scene {
    fn ready(&self) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async move { self.check() })
    }

    fn detect_once<'a>(
        &'a self,
        _frame: &'a Frame,
    ) -> BoxFuture<'a, Result<Option<Detection>, SourceError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            for _ in 0..self.yields {
                tokio::task::yield_now().await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.check()?;
            let face = self.face.lock().unwrap().clone();
            Ok(face.map(|descriptor| Detection {
                bounding_box: FACE_BOX,
                landmarks: vec![(140.0, 150.0), (210.0, 150.0), (175.0, 200.0)],
                descriptor,
            }))
        })
    }
}

/// Yields once per frame so other tasks get to run.
pub struct ImmediateClock;

impl FrameClock for ImmediateClock {
    fn next_frame(&self) -> BoxFuture<'_, ()> {
        Box::pin(tokio::task::yield_now())
    }
}

#[derive(Default)]
pub struct RecordingOverlay {
    clears: AtomicUsize,
    draws: AtomicUsize,
    last: Mutex<Option<Detection>>,
}

impl RecordingOverlay {
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }

    /// Last detection drawn, in display coordinates.
    pub fn last_drawn(&self) -> Option<Detection> {
        self.last.lock().unwrap().clone()
    }
}

impl Overlay for RecordingOverlay {
    fn clear_overlay(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn draw_detection(&self, detection: &Detection, source: FrameSize, display: FrameSize) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(detection.resized(source, display));
    }
}

pub struct Fixture {
    pub camera: Arc<FakeCamera>,
    pub scene: Arc<Scene>,
    pub overlay: Arc<RecordingOverlay>,
    sink: Arc<ChannelSink>,
    events: mpsc::UnboundedReceiver<StatusEvent>,
}

impl Fixture {
    fn new(scene: Scene) -> Self {
        let (sink, events) = ChannelSink::new();
        Self {
            camera: Arc::new(FakeCamera::default()),
            scene: Arc::new(scene),
            overlay: Arc::new(RecordingOverlay::default()),
            sink: Arc::new(sink),
            events,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            camera: self.camera.clone(),
            source: self.scene.clone(),
            clock: Arc::new(ImmediateClock),
            overlay: self.overlay.clone(),
            status: self.sink.clone(),
        }
    }

    pub async fn next_event(&mut self) -> StatusEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for a status event")
            .expect("status channel closed")
    }

    /// Skip events until one matches.
    pub async fn next_matching(&mut self, pred: impl Fn(&StatusEvent) -> bool) -> StatusEvent {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    pub fn try_next_event(&mut self) -> Option<StatusEvent> {
        self.events.try_recv().ok()
    }
}

pub fn fixture() -> Fixture {
    Fixture::new(Scene::with(None, 0))
}

/// Detection calls wait for [`Scene::release`].
pub fn gated_fixture() -> Fixture {
    Fixture::new(Scene::with(Some(Semaphore::new(0)), 0))
}

/// Detection calls suspend for a few scheduler turns.
pub fn slow_fixture(yields: usize) -> Fixture {
    Fixture::new(Scene::with(None, yields))
}
