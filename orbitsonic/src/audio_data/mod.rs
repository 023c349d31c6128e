//! Decoded PCM data and the decoder seam.
//!
//! A [`SoundDecoder`] turns a file into one or two mono [`PcmBuffer`]s. Stereo
//! sources are split into independent left and right buffers so each side can
//! be positioned as its own voice.

mod batch_resampler;
mod default_loader;
mod loader;

use crate::error::{OrbitSonicError, Result};
pub use batch_resampler::BatchResampler;
pub use default_loader::SymphoniaDecoder;
pub use loader::SoundDecoder;
use std::sync::Arc;
use std::time::Duration;

/// Mono f32 PCM samples at a fixed sample rate.
///
/// Cloning is cheap: the samples are shared.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Bit depth of every stored sample
    pub const BITS: u16 = 32;

    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub(crate) fn shared_samples(&self) -> Arc<[f32]> {
        self.samples.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Size of the sample data in bytes
    pub fn size_bytes(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Result of decoding one source file.
#[derive(Debug, Clone)]
pub struct DecodedSound {
    /// The only buffer of a mono source, or the left channel of a stereo one
    pub primary: PcmBuffer,
    /// Right channel of a stereo source
    pub secondary: Option<PcmBuffer>,
}

impl DecodedSound {
    pub fn mono(buffer: PcmBuffer) -> Self {
        Self {
            primary: buffer,
            secondary: None,
        }
    }

    pub fn stereo(left: PcmBuffer, right: PcmBuffer) -> Self {
        Self {
            primary: left,
            secondary: Some(right),
        }
    }

    /// Builds buffers from interleaved samples.
    ///
    /// Mono data becomes one buffer and stereo data is split into left and
    /// right. Any other channel count, or an empty decode, is rejected.
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if !(1..=2).contains(&channels) {
            return Err(OrbitSonicError::UnsupportedChannelCount(channels));
        }

        if samples.len() < channels {
            return Err(OrbitSonicError::AudioLoading(
                "Decoded audio contains no frames".to_string(),
            ));
        }

        if channels == 1 {
            return Ok(Self::mono(PcmBuffer::new(samples.to_vec(), sample_rate)));
        }

        // A trailing half frame is dropped so both sides stay the same length
        let (left, right): (Vec<f32>, Vec<f32>) = samples
            .chunks_exact(2)
            .map(|frame| (frame[0], frame[1]))
            .unzip();

        Ok(Self::stereo(
            PcmBuffer::new(left, sample_rate),
            PcmBuffer::new(right, sample_rate),
        ))
    }

    pub fn is_stereo(&self) -> bool {
        self.secondary.is_some()
    }

    /// All buffers, primary first
    pub fn buffers(&self) -> impl Iterator<Item = &PcmBuffer> {
        std::iter::once(&self.primary).chain(self.secondary.as_ref())
    }
}
