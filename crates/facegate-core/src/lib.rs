//! facegate-core — descriptor matching and the single-user signature registry.
//!
//! Face detection and embedding happen outside this crate; it only compares
//! the fixed-length descriptors they produce.

pub mod matcher;
pub mod registry;
pub mod types;

pub use matcher::{
    decide, distance, EuclideanMatcher, MatchError, MatchResult, Matcher, DEFAULT_THRESHOLD,
};
pub use registry::{Enrollment, RegistryError, RegistryView, SignatureRegistry, DEFAULT_LABEL};
pub use types::{BoundingBox, Descriptor, Detection, Frame, FrameSize};
