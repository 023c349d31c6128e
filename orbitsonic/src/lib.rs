pub mod audio_data;
pub mod backend;
pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod math;
pub mod playback;
pub mod sound_id;

#[cfg(test)]
mod test_utils;

pub use audio_data::{DecodedSound, PcmBuffer, SoundDecoder, SymphoniaDecoder};
pub use backend::{
    BufferHandle, BufferInfo, HrtfSelection, SpatialAudioBackend, SteamAudioBackend, VoiceHandle,
    VoiceState,
};
pub use callback::SoundFinishedCallback;
pub use config::{OrbitSonicEngineDesc, SteamBackendDesc, VoiceConfig};
pub use engine::OrbitSonicEngine;
pub use error::{OrbitSonicError, Result};
pub use events::OrbitSonicEvent;
pub use math::{Pose, Quat, Vec3};
pub use sound_id::SoundId;
