use crate::audio_data::PcmBuffer;
use crate::error::{OrbitSonicError, Result};

/// Offline resampler used when a decoded buffer is uploaded to a backend
/// running at a different rate.
pub struct BatchResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    chunk_size: usize,
}

impl BatchResampler {
    /// Creates a new batch resampler for offline audio processing.
    ///
    /// # Arguments
    /// * `source_sample_rate` - The sample rate of the input audio
    /// * `target_sample_rate` - The desired sample rate of the output audio
    /// * `chunk_size` - Optional size of processing chunks (defaults to 1024)
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(OrbitSonicError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    /// Resamples a single (mono, non-interleaved) channel.
    ///
    /// The resampler's latency is removed from the front and the output is
    /// trimmed to `ceil(len * ratio)` samples, so the sound keeps its timing
    /// and length.
    pub fn resample_channel(&self, channel_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(channel_samples.to_vec());
        }

        use rubato::{FftFixedIn, Resampler};

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            1, // single channel
        )
        .map_err(|e| OrbitSonicError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let expected_len = (channel_samples.len() as f64 * self.resample_ratio()).ceil() as usize;
        // The first `delay` output frames are filter latency, so keep feeding
        // zero chunks until the tail of the input has come out as well
        let delay = resampler.output_delay();
        let wanted = delay + expected_len;
        let mut output_buffer = Vec::with_capacity(wanted + self.chunk_size);

        let mut chunks = channel_samples.chunks(self.chunk_size);
        let mut waves_in = vec![vec![0.0f32; self.chunk_size]];
        while output_buffer.len() < wanted {
            let input_chunk = &mut waves_in[0];
            input_chunk.fill(0.0);
            if let Some(chunk) = chunks.next() {
                input_chunk[..chunk.len()].copy_from_slice(chunk);
            }

            let waves_out = resampler
                .process(&waves_in, None)
                .map_err(|e| OrbitSonicError::AudioLoading(format!("Resampling error: {}", e)))?;

            match waves_out.first() {
                Some(first_channel) if !first_channel.is_empty() => {
                    output_buffer.extend_from_slice(first_channel)
                }
                _ => {
                    return Err(OrbitSonicError::AudioLoading(
                        "Resampler produced no output".to_string(),
                    ));
                }
            }
        }

        output_buffer.drain(..delay);
        output_buffer.truncate(expected_len);
        Ok(output_buffer)
    }

    /// Resamples a whole buffer to the target rate.
    pub fn resample(&self, buffer: &PcmBuffer) -> Result<PcmBuffer> {
        if buffer.sample_rate() != self.source_sample_rate {
            return Err(OrbitSonicError::AudioFormat(format!(
                "Buffer is {} Hz but the resampler expects {} Hz",
                buffer.sample_rate(),
                self.source_sample_rate
            )));
        }

        let samples = self.resample_channel(buffer.samples())?;
        Ok(PcmBuffer::new(samples, self.target_sample_rate))
    }

    /// Calculates the resampling ratio (target/source).
    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}
