//! Emitters
//!
//! An emitter is a point from which audio appears to originate. Listeners
//! receive frames tagged with the emitter's controller id and place the sound
//! accordingly. Positioning, attenuation and the in-world object itself
//! belong to the host; [`EmitterHost`] is the seam.

use crate::error::{Error, Result};
use tracing::debug;

/// Addressable emission point
#[derive(Debug, Clone, PartialEq)]
pub struct Emitter {
    name: String,
    controller_id: u8,
    position: [f32; 3],
    /// Orientation quaternion (x, y, z, w)
    rotation: [f32; 4],
    spatial: bool,
    volume: f32,
    min_distance: f32,
    max_distance: f32,
}

impl Emitter {
    /// Default audible range in world units
    pub const DEFAULT_MIN_DISTANCE: f32 = 1.0;
    pub const DEFAULT_MAX_DISTANCE: f32 = 15.0;

    /// New spatial emitter at the origin
    pub fn new(name: impl Into<String>, controller_id: u8) -> Self {
        Self {
            name: name.into(),
            controller_id,
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            spatial: true,
            volume: 1.0,
            min_distance: Self::DEFAULT_MIN_DISTANCE,
            max_distance: Self::DEFAULT_MAX_DISTANCE,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller_id(&self) -> u8 {
        self.controller_id
    }

    pub fn position(&self) -> [f32; 3] {
        self.position
    }

    pub fn rotation(&self) -> [f32; 4] {
        self.rotation
    }

    pub fn is_spatial(&self) -> bool {
        self.spatial
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Audible range (min, max)
    pub fn distance(&self) -> (f32, f32) {
        (self.min_distance, self.max_distance)
    }

    pub fn set_position(&mut self, position: [f32; 3]) {
        self.position = position;
    }

    pub fn set_rotation(&mut self, rotation: [f32; 4]) {
        self.rotation = rotation;
    }

    /// Non-spatial emitters are heard at full volume everywhere
    pub fn set_spatial(&mut self, spatial: bool) {
        self.spatial = spatial;
    }

    /// Emitter gain, clamped to `0.0..=1.0`
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Set the audible range.
    ///
    /// # Errors
    /// `InvalidArgument` for negative distances or `max < min`.
    pub fn set_distance(&mut self, min: f32, max: f32) -> Result<()> {
        if min < 0.0 || max < min {
            return Err(Error::InvalidArgument(format!(
                "invalid emitter range {}..{}",
                min, max
            )));
        }
        self.min_distance = min;
        self.max_distance = max;
        Ok(())
    }
}

/// Host-side emitter resource management
pub trait EmitterHost: Send + Sync {
    /// An emitter was created and configured
    fn create(&self, emitter: &Emitter);

    /// An emitter's properties changed
    fn update(&self, emitter: &Emitter);

    /// An emitter was destroyed
    fn destroy(&self, emitter: &Emitter);
}

/// Host that only logs lifecycle calls (standalone server)
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEmitterHost;

impl EmitterHost for LoggingEmitterHost {
    fn create(&self, emitter: &Emitter) {
        debug!(
            "Emitter '{}' created (controller {}, spatial={})",
            emitter.name(),
            emitter.controller_id(),
            emitter.is_spatial()
        );
    }

    fn update(&self, emitter: &Emitter) {
        debug!("Emitter '{}' updated", emitter.name());
    }

    fn destroy(&self, emitter: &Emitter) {
        debug!(
            "Emitter '{}' destroyed (controller {})",
            emitter.name(),
            emitter.controller_id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let emitter = Emitter::new("speaker", 3);
        assert_eq!(emitter.controller_id(), 3);
        assert!(emitter.is_spatial());
        assert_eq!(emitter.rotation(), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_volume_clamped() {
        let mut emitter = Emitter::new("speaker", 0);
        emitter.set_volume(3.0);
        assert_eq!(emitter.volume(), 1.0);
        emitter.set_volume(-1.0);
        assert_eq!(emitter.volume(), 0.0);
    }

    #[test]
    fn test_distance_validation() {
        let mut emitter = Emitter::new("speaker", 0);
        assert!(emitter.set_distance(2.0, 30.0).is_ok());
        assert_eq!(emitter.distance(), (2.0, 30.0));
        assert!(emitter.set_distance(5.0, 1.0).is_err());
        assert!(emitter.set_distance(-1.0, 1.0).is_err());
        assert_eq!(emitter.distance(), (2.0, 30.0));
    }
}
