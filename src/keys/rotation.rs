//! Key rotation.
//!
//! Rotation only produces a new key pair linked to its predecessor. Retiring
//! the predecessor is a separate, explicit step owned by the caller.

use super::{KeyGenerationError, KeyPair, KeyPairGenerator, KeyRecord, RotationInfo};

pub const DEFAULT_ROTATION_REASON: &str = "Scheduled rotation";

#[derive(Debug, Clone)]
pub struct KeyRotator {
    generator: KeyPairGenerator,
    reason: String,
}

impl KeyRotator {
    pub fn new(generator: KeyPairGenerator) -> Self {
        Self {
            generator,
            reason: DEFAULT_ROTATION_REASON.to_string(),
        }
    }

    /// Use a different reason string for rotations made by this rotator.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Produce a successor key pair for `owner_id`.
    ///
    /// With `existing`, the new key records `previous_key_id` and the time and
    /// reason of the rotation. `existing` itself is left untouched.
    pub fn rotate(
        &self,
        owner_id: &str,
        existing: Option<&KeyRecord>,
    ) -> Result<KeyPair, KeyGenerationError> {
        let mut pair = self.generator.generate(owner_id)?;

        if let Some(previous) = existing {
            pair.record.previous_key_id = Some(previous.key_id.clone());
            pair.record.rotation = Some(RotationInfo {
                rotated_at: crate::unix_now(),
                reason: self.reason.clone(),
            });
            tracing::info!(
                action = "key_rotated",
                key_id = %pair.record.key_id,
                previous_key_id = %previous.key_id,
                owner_id = %owner_id,
                "Generated successor key"
            );
        }

        Ok(pair)
    }
}
