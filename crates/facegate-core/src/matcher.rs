//! Euclidean descriptor matching with a strict distance threshold.
//!
//! The metric and the default threshold follow the conventions of the
//! 128-dimensional face embedding model; a different model needs its own
//! threshold.

use crate::registry::Enrollment;
use crate::types::Descriptor;
use thiserror::Error;

/// Default acceptance threshold: a probe is accepted when its distance to the
/// enrolled descriptor is strictly below this value.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchError {
    #[error("descriptor dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Outcome of comparing one probe against the enrolled descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub distance: f32,
    pub accepted: bool,
    /// Identity tag of the enrollment, set only when accepted.
    pub label: Option<String>,
}

/// Euclidean distance between two descriptors of equal dimensionality.
pub fn distance(a: &Descriptor, b: &Descriptor) -> Result<f32, MatchError> {
    if a.len() != b.len() {
        return Err(MatchError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    Ok(a.values()
        .iter()
        .zip(b.values().iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt())
}

/// Accept iff `distance < threshold`. A distance equal to the threshold is a
/// rejection, and so is NaN.
pub fn decide(distance: f32, threshold: f32) -> bool {
    distance < threshold
}

/// Strategy for comparing a probe descriptor against the enrolled one.
pub trait Matcher {
    fn distance(&self, probe: &Descriptor, reference: &Descriptor) -> Result<f32, MatchError>;

    fn decide(&self, distance: f32) -> bool;

    fn compare(
        &self,
        probe: &Descriptor,
        enrollment: &Enrollment,
    ) -> Result<MatchResult, MatchError> {
        let distance = self.distance(probe, &enrollment.descriptor)?;
        let accepted = self.decide(distance);
        Ok(MatchResult {
            distance,
            accepted,
            label: accepted.then(|| enrollment.label.clone()),
        })
    }
}

/// Euclidean distance matcher with a configurable threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn distance(&self, probe: &Descriptor, reference: &Descriptor) -> Result<f32, MatchError> {
        distance(probe, reference)
    }

    fn decide(&self, distance: f32) -> bool {
        decide(distance, self.threshold)
    }
}
