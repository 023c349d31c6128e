use crate::math::Vec3;

/// How a voice is placed when it is created
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceConfig {
    /// Interpret positions as offsets from the listener instead of world positions.
    ///
    /// Relative voices follow the listener, so orbit updates never need to
    /// compensate for where the listener is or which way it faces.
    pub listener_relative: bool,
    /// Position the voice starts at before the first position update
    pub initial_position: Vec3,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            listener_relative: true,
            initial_position: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}
