use crate::config::{SteamBackendDesc, VoiceConfig};
use std::f32::consts::PI;
use std::time::Duration;

/// Configuration descriptor for an [`OrbitSonicEngine`](crate::OrbitSonicEngine)
#[derive(Debug, Clone)]
pub struct OrbitSonicEngineDesc {
    /// How often a playing sound's monitor checks whether it has finished
    pub poll_interval: Duration,
    /// Separation in radians between the two voices of a stereo sound
    pub initial_stereo_angle: f32,
    /// Placement of newly created voices
    pub voice: VoiceConfig,
    /// Settings for the default Steam Audio backend (ignored by custom backends)
    pub backend: SteamBackendDesc,
    /// Events kept for [`poll_events`](crate::OrbitSonicEngine::poll_events) before
    /// new ones are dropped (0 disables events)
    pub event_capacity: usize,
}

impl Default for OrbitSonicEngineDesc {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            initial_stereo_angle: PI / 6.0,
            voice: VoiceConfig::default(),
            backend: SteamBackendDesc::default(),
            event_capacity: 256,
        }
    }
}

impl OrbitSonicEngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn initial_stereo_angle(mut self, radians: f32) -> Self {
        self.initial_stereo_angle = radians;
        self
    }

    pub fn voice(mut self, voice: VoiceConfig) -> Self {
        self.voice = voice;
        self
    }

    pub fn backend(mut self, backend: SteamBackendDesc) -> Self {
        self.backend = backend;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}
