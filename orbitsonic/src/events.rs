//! Event types for OrbitSonic

use crate::backend::HrtfSelection;
use crate::sound_id::SoundId;

#[derive(Debug, Clone, PartialEq)]
pub enum OrbitSonicEvent {
    EngineInitialized { hrtf: HrtfSelection },
    EngineShutdown,
    SoundCreated { sound_id: SoundId },
    SoundStarted { sound_id: SoundId },
    SoundPaused { sound_id: SoundId },
    SoundResumed { sound_id: SoundId },
    /// Stopped by the host
    SoundStopped { sound_id: SoundId },
    /// Played to its end and was removed from the engine
    SoundFinished { sound_id: SoundId },
}

impl OrbitSonicEvent {
    pub fn sound_id(&self) -> Option<&SoundId> {
        match self {
            Self::SoundCreated { sound_id }
            | Self::SoundStarted { sound_id }
            | Self::SoundPaused { sound_id }
            | Self::SoundResumed { sound_id }
            | Self::SoundStopped { sound_id }
            | Self::SoundFinished { sound_id } => Some(sound_id),
            Self::EngineInitialized { .. } | Self::EngineShutdown => None,
        }
    }

    pub fn is_sound_event(&self) -> bool {
        self.sound_id().is_some()
    }
}
