use crate::{
    audio_data::{DecodedSound, SoundDecoder},
    error::{OrbitSonicError, Result},
};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Default decoder implementation using the Symphonia decoder library.
///
/// Supports the formats enabled in Symphonia's default feature set (WAV, FLAC,
/// OGG/Vorbis, ...). Samples are converted to f32 and stereo files are split
/// into separate left and right buffers.
///
/// # Examples
///
/// ```ignore
/// use orbitsonic::audio_data::{SoundDecoder, SymphoniaDecoder};
///
/// let decoded = SymphoniaDecoder.decode("path/to/audio.flac".as_ref())?;
/// println!("stereo: {}", decoded.is_stereo());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SoundDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedSound> {
        let file = File::open(path)?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probe = get_probe();
        let probed = probe
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                OrbitSonicError::AudioLoading(format!("Failed to probe audio format: {:?}", e))
            })?;

        let mut format = probed.format;

        let track = format.default_track().ok_or_else(|| {
            OrbitSonicError::AudioLoading("No default audio track found".to_string())
        })?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| OrbitSonicError::AudioLoading("Sample rate not found".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| OrbitSonicError::AudioLoading("Channel count not found".to_string()))?
            .count();

        // Reject early instead of decoding a whole surround file for nothing
        if !(1..=2).contains(&channels) {
            return Err(OrbitSonicError::UnsupportedChannelCount(channels));
        }

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                OrbitSonicError::AudioLoading(format!("Failed to create decoder: {:?}", e))
            })?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end-of-file
                Err(e) => {
                    return Err(OrbitSonicError::AudioLoading(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break, // also EOF in some formats
                Err(Error::DecodeError(_)) => continue, // recoverable corruption
                Err(e) => {
                    return Err(OrbitSonicError::AudioLoading(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let capacity = decoded.capacity();

            let mut tmp = SampleBuffer::<f32>::new(capacity as u64, spec);
            tmp.copy_interleaved_ref(decoded);

            samples.extend_from_slice(tmp.samples());
        }

        log::debug!(
            "Decoded {} ({} Hz, {} channel(s), {} samples)",
            path.display(),
            sample_rate,
            channels,
            samples.len()
        );

        DecodedSound::from_interleaved(&samples, channels, sample_rate)
    }
}
