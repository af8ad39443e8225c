//! Single-user signature registry.
//!
//! Holds at most one enrolled descriptor. The owner writes through
//! [`SignatureRegistry`]; readers (the verification loop) hold a
//! [`RegistryView`] that always observes the latest registration.

use crate::types::Descriptor;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// Identity tag used when none is configured.
pub const DEFAULT_LABEL: &str = "user";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no face registered")]
    NotRegistered,
}

/// The enrolled descriptor with its identity tag.
#[derive(Debug, Clone)]
pub struct Enrollment {
    /// Random per-registration id, for log correlation only.
    pub id: Uuid,
    pub label: String,
    pub descriptor: Descriptor,
    pub registered_at: DateTime<Utc>,
}

type Slot = Option<Arc<Enrollment>>;

/// Writable registry. Exactly one owner.
pub struct SignatureRegistry {
    label: String,
    slot: watch::Sender<Slot>,
}

impl SignatureRegistry {
    pub fn new(label: impl Into<String>) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            label: label.into(),
            slot,
        }
    }

    /// Store `descriptor`, replacing any prior enrollment.
    pub fn register(&mut self, descriptor: Descriptor) -> Arc<Enrollment> {
        let enrollment = Arc::new(Enrollment {
            id: Uuid::new_v4(),
            label: self.label.clone(),
            descriptor,
            registered_at: Utc::now(),
        });
        let previous = self.slot.send_replace(Some(Arc::clone(&enrollment)));

        tracing::info!(
            id = %enrollment.id,
            label = %enrollment.label,
            dimensions = enrollment.descriptor.len(),
            registered_at = %enrollment.registered_at,
            replaced = previous.is_some(),
            "descriptor registered"
        );
        enrollment
    }

    pub fn clear(&mut self) {
        if let Some(previous) = self.slot.send_replace(None) {
            tracing::info!(id = %previous.id, "registration cleared");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn get(&self) -> Result<Arc<Enrollment>, RegistryError> {
        self.slot.borrow().clone().ok_or(RegistryError::NotRegistered)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read-only handle that tracks every later `register`/`clear`.
    pub fn view(&self) -> RegistryView {
        RegistryView {
            slot: self.slot.subscribe(),
        }
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL)
    }
}

/// Read-only view of a [`SignatureRegistry`].
#[derive(Clone)]
pub struct RegistryView {
    slot: watch::Receiver<Slot>,
}

impl RegistryView {
    pub fn is_registered(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn get(&self) -> Result<Arc<Enrollment>, RegistryError> {
        self.slot.borrow().clone().ok_or(RegistryError::NotRegistered)
    }
}
