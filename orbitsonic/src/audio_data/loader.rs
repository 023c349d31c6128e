use crate::audio_data::DecodedSound;
use crate::error::Result;
use std::path::Path;

/// Trait for turning an audio file into PCM buffers.
///
/// OrbitSonic ships [`SymphoniaDecoder`](crate::audio_data::SymphoniaDecoder),
/// but hosts can bring their own decoder for formats or sources it does not
/// cover.
///
/// # Contract
///
/// - A mono source yields only `primary`.
/// - A stereo source yields its left channel as `primary` and its right
///   channel as `secondary`. Never one without the other.
/// - Any failure (unreadable file, channel count outside 1..=2, empty or
///   short read) is an `Err`; no partial result is returned.
///
/// # Example
///
/// ```ignore
/// use orbitsonic::audio_data::{DecodedSound, PcmBuffer, SoundDecoder};
/// use orbitsonic::error::Result;
/// use std::path::Path;
///
/// struct SilenceDecoder;
///
/// impl SoundDecoder for SilenceDecoder {
///     fn decode(&self, _path: &Path) -> Result<DecodedSound> {
///         Ok(DecodedSound::mono(PcmBuffer::new(vec![0.0; 48000], 48000)))
///     }
/// }
/// ```
pub trait SoundDecoder: Send + Sync {
    /// Decodes the file at `path`.
    fn decode(&self, path: &Path) -> Result<DecodedSound>;
}
