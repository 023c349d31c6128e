//! Spatial audio backend seam.
//!
//! The engine only talks to audio hardware through [`SpatialAudioBackend`]:
//! device/session lifecycle, the listener pose, buffers, voices and the
//! suspend/resume bracket used to make multi-voice position updates atomic.
//!
//! - [`SteamAudioBackend`]: the default backend (cpal output + Steam Audio HRTF rendering)
//! - [`VoiceTable`]: backend-agnostic voice and buffer bookkeeping shared by backends
//! - [`hrtf_catalog`]: discovery of named HRTF profiles on disk

pub mod hrtf_catalog;
mod steam;
mod voice_table;

pub use steam::SteamAudioBackend;
pub use voice_table::{RenderedVoice, VoiceTable};

use crate::audio_data::PcmBuffer;
use crate::config::VoiceConfig;
use crate::error::Result;
use crate::math::{Pose, Vec3};
use std::fmt;

/// Handle to a voice owned by a backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(u32);

impl VoiceHandle {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoiceHandle({})", self.0)
    }
}

/// Handle to a PCM buffer uploaded to a backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferHandle({})", self.0)
    }
}

/// Transport state of a voice as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Created but never started
    Initial,
    /// Advancing through its buffer
    Playing,
    /// Holding its position
    Paused,
    /// Stopped explicitly or by reaching the end of its buffer
    Stopped,
}

/// Format description of an uploaded buffer, as it was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub size_bytes: usize,
    pub channels: u16,
    pub bits: u16,
    pub sample_rate: u32,
}

impl BufferInfo {
    pub fn from_pcm(buffer: &PcmBuffer) -> Self {
        Self {
            size_bytes: buffer.size_bytes(),
            channels: 1,
            bits: PcmBuffer::BITS,
            sample_rate: buffer.sample_rate(),
        }
    }

    /// Playing time of the buffer in seconds:
    /// `(size_bytes * 8) / (channels * bits) / sample_rate`.
    pub fn duration_secs(&self) -> f32 {
        let bits_per_frame = self.channels as u64 * self.bits as u64;
        if bits_per_frame == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        let frames = (self.size_bytes as u64 * 8) / bits_per_frame;
        (frames as f64 / self.sample_rate as f64) as f32
    }
}

/// HRTF profile chosen when a backend was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HrtfSelection {
    /// The backend's built-in HRTF
    Default,
    /// A named profile from the backend's catalog
    Named(String),
}

impl fmt::Display for HrtfSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default HRTF"),
            Self::Named(name) => write!(f, "HRTF \"{}\"", name),
        }
    }
}

/// A stateful spatial-audio output with one listener and many point-source voices.
///
/// Every method takes `&self`; implementations synchronize internally because
/// completion monitors poll voices from their own threads while the engine
/// mutates others. Per-call failures come back as `Err` and never affect
/// other voices.
pub trait SpatialAudioBackend: Send + Sync {
    /// Opens the output device and rendering session.
    ///
    /// An empty or unknown `hrtf_preference` is not an error: the backend
    /// falls back to its default HRTF, logs a warning and reports
    /// [`HrtfSelection::Default`].
    fn open(&self, hrtf_preference: &str) -> Result<HrtfSelection>;

    /// Closes the session, dropping every voice and buffer. Safe to call when closed.
    fn close(&self);

    fn is_open(&self) -> bool;

    /// Names of the HRTF profiles that `open` can select.
    fn available_hrtfs(&self) -> Vec<String>;

    fn set_listener(&self, pose: Pose) -> Result<()>;

    fn create_buffer(&self, pcm: &PcmBuffer) -> Result<BufferHandle>;

    fn destroy_buffer(&self, buffer: BufferHandle) -> Result<()>;

    fn buffer_info(&self, buffer: BufferHandle) -> Result<BufferInfo>;

    fn create_voice(&self, buffer: BufferHandle, config: VoiceConfig) -> Result<VoiceHandle>;

    fn destroy_voice(&self, voice: VoiceHandle) -> Result<()>;

    /// Starts a voice; a paused voice continues, a stopped one restarts from the beginning.
    fn play_voice(&self, voice: VoiceHandle) -> Result<()>;

    fn pause_voice(&self, voice: VoiceHandle) -> Result<()>;

    /// Stops a voice and rewinds it.
    fn stop_voice(&self, voice: VoiceHandle) -> Result<()>;

    fn voice_state(&self, voice: VoiceHandle) -> Result<VoiceState>;

    /// Moves a voice. While processing is suspended the move is staged and
    /// only becomes audible when the outermost suspension is resumed.
    fn set_voice_position(&self, voice: VoiceHandle, position: Vec3) -> Result<()>;

    /// Playback offset of a voice in seconds.
    fn voice_offset(&self, voice: VoiceHandle) -> Result<f32>;

    fn set_voice_offset(&self, voice: VoiceHandle, seconds: f32) -> Result<()>;

    /// Begins an atomic update. Calls nest.
    fn suspend_processing(&self);

    /// Ends an atomic update, committing staged changes at the outermost level.
    fn resume_processing(&self);
}
