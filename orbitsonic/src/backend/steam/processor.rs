use super::hrtf;
use super::renderer::BlockProcessor;
use crate::backend::hrtf_catalog::HrtfProfile;
use crate::backend::{HrtfSelection, RenderedVoice, VoiceHandle};
use crate::config::SteamBackendDesc;
use crate::error::{OrbitSonicError, Result};
use crate::math::{Pose, Vec3};
use audionimbus::{
    AmbisonicsDecodeEffect, AmbisonicsDecodeEffectParams, AmbisonicsDecodeEffectSettings,
    AmbisonicsEncodeEffect, AmbisonicsEncodeEffectParams, AmbisonicsEncodeEffectSettings,
    AudioBufferSettings, AudioSettings, Context, CoordinateSystem, Direction, Hrtf, SpeakerLayout,
    Vector3, audio_buffer::AudioBuffer as AudioNimbusAudioBuffer,
};
use std::collections::HashMap;

/// Steam Audio ambisonics pipeline: every voice is encoded toward its
/// direction from the listener, the sum is decoded binaurally through the HRTF.
pub struct SpatialProcessor {
    context: Context,
    hrtf: Hrtf,

    // Shared by all voices
    ambisonics_decode_effect: AmbisonicsDecodeEffect,
    // Created on first render, dropped once a voice stops rendering
    encode_effects: HashMap<VoiceHandle, AmbisonicsEncodeEffect>,

    sample_rate: u32,
    frame_size: usize,
    order: u32,
    ambisonics_channels: usize,

    cached_input_buf: Vec<f32>,
    cached_summed_encoded_buf: Vec<f32>,
    cached_ambisonics_encode_buf: Vec<f32>,
    cached_ambisonics_decode_buf: Vec<f32>,
}

impl SpatialProcessor {
    pub fn new(
        desc: &SteamBackendDesc,
        hrtf_profile: Option<&HrtfProfile>,
    ) -> Result<(Self, HrtfSelection)> {
        log::info!(
            "Initializing Steam Audio spatial processor (sample_rate: {} Hz, frame_size: {}, order: {})",
            desc.sample_rate,
            desc.frame_size,
            desc.ambisonics_order
        );

        let context = Context::try_new(&audionimbus::ContextSettings::default()).map_err(|e| {
            OrbitSonicError::SpatialAudio(format!("Failed to create Steam Audio context: {}", e))
        })?;

        let audio_settings = AudioSettings {
            sampling_rate: desc.sample_rate,
            frame_size: desc.frame_size as u32,
        };

        let (hrtf, selection) =
            hrtf::create_selected_hrtf(&context, &audio_settings, hrtf_profile)?;

        let ambisonics_decode_effect = AmbisonicsDecodeEffect::try_new(
            &context,
            &audio_settings,
            &AmbisonicsDecodeEffectSettings {
                max_order: desc.ambisonics_order,
                speaker_layout: SpeakerLayout::Stereo,
                hrtf: &hrtf,
            },
        )
        .map_err(|e| {
            OrbitSonicError::SpatialAudio(format!("Failed to create AmbisonicsDecodeEffect: {}", e))
        })?;

        let frame_size = desc.frame_size;
        let ambisonics_channels = desc.ambisonics_channels();

        Ok((
            Self {
                context,
                hrtf,
                ambisonics_decode_effect,
                encode_effects: HashMap::new(),
                sample_rate: desc.sample_rate,
                frame_size,
                order: desc.ambisonics_order,
                ambisonics_channels,
                cached_input_buf: vec![0.0; frame_size],
                cached_summed_encoded_buf: vec![0.0; frame_size * ambisonics_channels],
                cached_ambisonics_encode_buf: vec![0.0; frame_size * ambisonics_channels],
                cached_ambisonics_decode_buf: vec![0.0; frame_size * 2],
            },
            selection,
        ))
    }

    fn encode_voice(&mut self, listener: &Pose, voice: &RenderedVoice) -> Result<()> {
        if !self.encode_effects.contains_key(&voice.voice) {
            let audio_settings = AudioSettings {
                sampling_rate: self.sample_rate,
                frame_size: self.frame_size as u32,
            };
            let effect = AmbisonicsEncodeEffect::try_new(
                &self.context,
                &audio_settings,
                &AmbisonicsEncodeEffectSettings {
                    max_order: self.order,
                },
            )
            .map_err(|e| {
                OrbitSonicError::SpatialAudio(format!(
                    "Failed to create AmbisonicsEncodeEffect: {}",
                    e
                ))
            })?;
            self.encode_effects.insert(voice.voice, effect);
        }

        let distance = (voice.position - listener.position).length();
        let gain = distance_gain(distance);
        let direction = target_direction(listener, voice.position);

        let frames = voice.samples.len().min(self.frame_size);
        self.cached_input_buf.fill(0.0);
        for (dst, src) in self.cached_input_buf[..frames]
            .iter_mut()
            .zip(&voice.samples[..frames])
        {
            *dst = src * gain;
        }

        let Some(effect) = self.encode_effects.get_mut(&voice.voice) else {
            return Ok(());
        };

        let params = AmbisonicsEncodeEffectParams {
            direction: Direction::new(direction.x, direction.y, direction.z),
            order: self.order,
        };

        let input_buf = AudioNimbusAudioBuffer::try_with_data_and_settings(
            &self.cached_input_buf,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(|e| {
            OrbitSonicError::SpatialAudio(format!("Failed to create input buffer: {}", e))
        })?;

        let output_buf = AudioNimbusAudioBuffer::try_with_data_and_settings(
            &mut self.cached_ambisonics_encode_buf,
            AudioBufferSettings {
                num_channels: Some(self.ambisonics_channels as u32),
                ..Default::default()
            },
        )
        .map_err(|e| {
            OrbitSonicError::SpatialAudio(format!("Failed to create output buffer: {}", e))
        })?;

        effect.apply(&params, &input_buf, &output_buf);

        for (sum, encoded) in self
            .cached_summed_encoded_buf
            .iter_mut()
            .zip(&self.cached_ambisonics_encode_buf)
        {
            *sum += *encoded;
        }

        Ok(())
    }

    fn decode_to_stereo(&mut self, output: &mut [f32]) -> Result<()> {
        let params = AmbisonicsDecodeEffectParams {
            order: self.order,
            hrtf: &self.hrtf,
            orientation: CoordinateSystem {
                ahead: Vector3::new(0.0, 0.0, -1.0),
                ..Default::default()
            },
            binaural: true,
        };

        let input_buf = AudioNimbusAudioBuffer::try_with_data_and_settings(
            &self.cached_summed_encoded_buf,
            AudioBufferSettings {
                num_channels: Some(self.ambisonics_channels as u32),
                ..Default::default()
            },
        )
        .map_err(|e| {
            OrbitSonicError::SpatialAudio(format!("Failed to create input buffer: {}", e))
        })?;

        let output_buf = AudioNimbusAudioBuffer::try_with_data_and_settings(
            &mut self.cached_ambisonics_decode_buf,
            AudioBufferSettings {
                num_channels: Some(2),
                ..Default::default()
            },
        )
        .map_err(|e| {
            OrbitSonicError::SpatialAudio(format!("Failed to create output buffer: {}", e))
        })?;

        self.ambisonics_decode_effect
            .apply(&params, &input_buf, &output_buf);

        let decoded_buf = AudioNimbusAudioBuffer::try_with_data_and_settings(
            &mut self.cached_ambisonics_decode_buf,
            AudioBufferSettings {
                num_channels: Some(2),
                ..Default::default()
            },
        )
        .map_err(|e| {
            OrbitSonicError::SpatialAudio(format!("Failed to create decoded buffer: {}", e))
        })?;

        decoded_buf.interleave(&self.context, output);
        Ok(())
    }
}

impl BlockProcessor for SpatialProcessor {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn process(
        &mut self,
        listener: &Pose,
        voices: &[RenderedVoice],
        output: &mut [f32],
    ) -> Result<()> {
        self.encode_effects
            .retain(|handle, _| voices.iter().any(|voice| voice.voice == *handle));

        if voices.is_empty() {
            output.fill(0.0);
            return Ok(());
        }

        self.cached_summed_encoded_buf.fill(0.0);
        for voice in voices {
            self.encode_voice(listener, voice)?;
        }

        self.decode_to_stereo(output)
    }
}

/// Inverse-distance attenuation with a reference distance of 1.
fn distance_gain(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    1.0 / distance.max(1.0)
}

/// Direction from the listener to a source, in the listener's coordinate system.
fn target_direction(listener: &Pose, source_position: Vec3) -> Vec3 {
    let target_direction = (source_position - listener.position).normalize_or_zero();
    if target_direction == Vec3::ZERO {
        // A source exactly at the listener is treated as straight ahead
        return Vec3::new(0.0, 0.0, 1.0);
    }
    Vec3::new(
        target_direction.dot(listener.right()),
        target_direction.dot(listener.up()),
        target_direction.dot(listener.forward()),
    )
}
