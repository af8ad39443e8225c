use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Width and height of a captured frame or of the display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A captured camera frame, handed unchanged to the descriptor source.
#[derive(Clone)]
pub struct Frame {
    /// Raw pixel data. The layout is whatever the frame source and the
    /// descriptor source agree on; the core never inspects it.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    /// Capture time.
    pub timestamp: Instant,
}

impl Frame {
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Time elapsed since capture.
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Bounding box for a detected face, in the coordinates of the frame it was detected in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub confidence: f32,
}

/// Face descriptor: the fixed-length embedding produced by the descriptor source
/// (128-dimensional for the default face model).
///
/// Immutable once produced. Serializes as a plain array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// One face found by a single detection attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    /// Facial landmark points (68 for the default landmark model).
    #[serde(default)]
    pub landmarks: Vec<(f32, f32)>,
    pub descriptor: Descriptor,
}

impl Detection {
    /// Rescale box and landmarks from `source` frame coordinates to `display`
    /// coordinates. Each axis is scaled independently. The descriptor is untouched.
    ///
    /// Returns an unscaled copy if either size is degenerate.
    pub fn resized(&self, source: FrameSize, display: FrameSize) -> Detection {
        if source.is_empty() || display.is_empty() {
            return self.clone();
        }

        let sx = display.width as f32 / source.width as f32;
        let sy = display.height as f32 / source.height as f32;

        Detection {
            bounding_box: BoundingBox {
                x: self.bounding_box.x * sx,
                y: self.bounding_box.y * sy,
                width: self.bounding_box.width * sx,
                height: self.bounding_box.height * sy,
                confidence: self.bounding_box.confidence,
            },
            landmarks: self
                .landmarks
                .iter()
                .map(|&(x, y)| (x * sx, y * sy))
                .collect(),
            descriptor: self.descriptor.clone(),
        }
    }
}
