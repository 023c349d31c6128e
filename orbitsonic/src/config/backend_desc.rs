use std::path::PathBuf;

/// Configuration descriptor for the Steam Audio backend
#[derive(Debug, Clone)]
pub struct SteamBackendDesc {
    /// Sample rate of the output stream. Uploaded buffers are resampled to it.
    pub sample_rate: u32,
    /// Number of frames rendered per spatialization block
    pub frame_size: usize,
    /// Number of output device channels (the binaural mix is stereo and is mapped onto these)
    pub channels: u16,
    /// Directory scanned for `*.sofa` HRTF profiles (None means only the built-in HRTF exists)
    pub hrtf_dir: Option<PathBuf>,
    /// Ambisonics order used to encode every voice
    pub ambisonics_order: u32,
}

impl Default for SteamBackendDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            frame_size: 1024,
            channels: 2,
            hrtf_dir: None,
            ambisonics_order: 2,
        }
    }
}

impl SteamBackendDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn frame_size(mut self, size: usize) -> Self {
        self.frame_size = size;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn hrtf_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hrtf_dir = Some(dir.into());
        self
    }

    pub fn ambisonics_order(mut self, order: u32) -> Self {
        self.ambisonics_order = order;
        self
    }

    /// Number of ambisonics channels for the configured order
    pub fn ambisonics_channels(&self) -> usize {
        let order = self.ambisonics_order as usize;
        (order + 1) * (order + 1)
    }
}
