//! Error types for OrbitSonic

use crate::backend::{BufferHandle, VoiceHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrbitSonicError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Unsupported channel count: {0} (only mono and stereo sources can be spatialized)")]
    UnsupportedChannelCount(usize),

    #[error("Spatial audio error: {0}")]
    SpatialAudio(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Spatial audio backend is not open")]
    BackendClosed,

    #[error("Unknown voice {0}")]
    UnknownVoice(VoiceHandle),

    #[error("Unknown buffer {0}")]
    UnknownBuffer(BufferHandle),
}

pub type Result<T> = std::result::Result<T, OrbitSonicError>;
