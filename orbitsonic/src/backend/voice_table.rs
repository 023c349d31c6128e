use crate::backend::{BufferHandle, BufferInfo, VoiceHandle, VoiceState};
use crate::config::VoiceConfig;
use crate::error::{OrbitSonicError, Result};
use crate::math::{Pose, Vec3};
use std::collections::HashMap;
use std::sync::Arc;

struct StoredBuffer {
    samples: Arc<[f32]>,
    /// Rate the samples are stored at, which may differ from `info.sample_rate`
    playback_rate: u32,
    info: BufferInfo,
}

struct VoiceSlot {
    buffer: BufferHandle,
    samples: Arc<[f32]>,
    playback_rate: u32,
    cursor: usize,
    state: VoiceState,
    position: Vec3,
    listener_relative: bool,
}

impl VoiceSlot {
    /// Copies the next block into `out`, zero-filling past the end of the buffer.
    /// Reaching the end stops and rewinds the voice.
    fn advance_into(&mut self, out: &mut [f32]) {
        let remaining = self.samples.len().saturating_sub(self.cursor);
        let count = remaining.min(out.len());

        out[..count].copy_from_slice(&self.samples[self.cursor..self.cursor + count]);
        out[count..].fill(0.0);

        self.cursor += count;
        if self.cursor >= self.samples.len() {
            self.state = VoiceState::Stopped;
            self.cursor = 0;
        }
    }
}

/// One playing voice's contribution to a render block.
#[derive(Debug, Clone)]
pub struct RenderedVoice {
    pub voice: VoiceHandle,
    /// World-space position (listener-relative voices are already resolved)
    pub position: Vec3,
    /// Mono input samples for this block
    pub samples: Vec<f32>,
}

/// Voice, buffer and listener bookkeeping for a spatial backend.
///
/// The table knows nothing about devices or DSP. A backend wraps it in a mutex,
/// forwards the [`SpatialAudioBackend`](crate::backend::SpatialAudioBackend)
/// calls to it and pulls mono blocks out of it with [`VoiceTable::pull_block`].
pub struct VoiceTable {
    open: bool,
    listener: Pose,
    buffers: HashMap<BufferHandle, StoredBuffer>,
    voices: HashMap<VoiceHandle, VoiceSlot>,
    next_buffer: u32,
    next_voice: u32,
    suspend_depth: u32,
    staged_positions: HashMap<VoiceHandle, Vec3>,
}

impl Default for VoiceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceTable {
    pub fn new() -> Self {
        Self {
            open: false,
            listener: Pose::identity(),
            buffers: HashMap::new(),
            voices: HashMap::new(),
            next_buffer: 1,
            next_voice: 1,
            suspend_depth: 0,
            staged_positions: HashMap::new(),
        }
    }

    pub fn open(&mut self) {
        self.open = true;
        self.suspend_depth = 0;
        self.staged_positions.clear();
    }

    /// Drops every voice and buffer and resets the listener.
    pub fn close(&mut self) {
        self.open = false;
        self.voices.clear();
        self.buffers.clear();
        self.staged_positions.clear();
        self.suspend_depth = 0;
        self.listener = Pose::identity();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(OrbitSonicError::BackendClosed)
        }
    }

    pub fn set_listener(&mut self, pose: Pose) -> Result<()> {
        self.ensure_open()?;
        self.listener = pose;
        Ok(())
    }

    pub fn listener(&self) -> Pose {
        self.listener
    }

    /// Stores samples that play back at `playback_rate`; `info` describes the
    /// buffer as it was supplied.
    pub fn insert_buffer(
        &mut self,
        samples: Arc<[f32]>,
        playback_rate: u32,
        info: BufferInfo,
    ) -> Result<BufferHandle> {
        self.ensure_open()?;
        if playback_rate == 0 {
            return Err(OrbitSonicError::AudioFormat(
                "Buffer sample rate must be greater than 0".to_string(),
            ));
        }

        let handle = BufferHandle::new(self.next_buffer);
        self.next_buffer = self.next_buffer.wrapping_add(1).max(1);
        self.buffers.insert(
            handle,
            StoredBuffer {
                samples,
                playback_rate,
                info,
            },
        );
        Ok(handle)
    }

    /// Removes a buffer. Fails while a voice still plays from it.
    pub fn remove_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.ensure_open()?;
        if !self.buffers.contains_key(&buffer) {
            return Err(OrbitSonicError::UnknownBuffer(buffer));
        }
        if self.voices.values().any(|voice| voice.buffer == buffer) {
            return Err(OrbitSonicError::SpatialAudio(format!(
                "{} is still attached to a voice",
                buffer
            )));
        }
        self.buffers.remove(&buffer);
        Ok(())
    }

    pub fn buffer_info(&self, buffer: BufferHandle) -> Result<BufferInfo> {
        self.ensure_open()?;
        self.buffers
            .get(&buffer)
            .map(|stored| stored.info)
            .ok_or(OrbitSonicError::UnknownBuffer(buffer))
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn create_voice(
        &mut self,
        buffer: BufferHandle,
        config: VoiceConfig,
    ) -> Result<VoiceHandle> {
        self.ensure_open()?;
        let stored = self
            .buffers
            .get(&buffer)
            .ok_or(OrbitSonicError::UnknownBuffer(buffer))?;

        let handle = VoiceHandle::new(self.next_voice);
        self.next_voice = self.next_voice.wrapping_add(1).max(1);
        self.voices.insert(
            handle,
            VoiceSlot {
                buffer,
                samples: stored.samples.clone(),
                playback_rate: stored.playback_rate,
                cursor: 0,
                state: VoiceState::Initial,
                position: config.initial_position,
                listener_relative: config.listener_relative,
            },
        );
        Ok(handle)
    }

    pub fn remove_voice(&mut self, voice: VoiceHandle) -> Result<()> {
        self.ensure_open()?;
        self.staged_positions.remove(&voice);
        self.voices
            .remove(&voice)
            .map(|_| ())
            .ok_or(OrbitSonicError::UnknownVoice(voice))
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    fn slot_mut(&mut self, voice: VoiceHandle) -> Result<&mut VoiceSlot> {
        self.ensure_open()?;
        self.voices
            .get_mut(&voice)
            .ok_or(OrbitSonicError::UnknownVoice(voice))
    }

    fn slot(&self, voice: VoiceHandle) -> Result<&VoiceSlot> {
        self.ensure_open()?;
        self.voices
            .get(&voice)
            .ok_or(OrbitSonicError::UnknownVoice(voice))
    }

    pub fn play(&mut self, voice: VoiceHandle) -> Result<()> {
        let slot = self.slot_mut(voice)?;
        if slot.state == VoiceState::Stopped {
            slot.cursor = 0;
        }
        slot.state = VoiceState::Playing;
        Ok(())
    }

    /// Pausing a voice that is not playing leaves it unchanged.
    pub fn pause(&mut self, voice: VoiceHandle) -> Result<()> {
        let slot = self.slot_mut(voice)?;
        if slot.state == VoiceState::Playing {
            slot.state = VoiceState::Paused;
        }
        Ok(())
    }

    pub fn stop(&mut self, voice: VoiceHandle) -> Result<()> {
        let slot = self.slot_mut(voice)?;
        slot.state = VoiceState::Stopped;
        slot.cursor = 0;
        Ok(())
    }

    pub fn state(&self, voice: VoiceHandle) -> Result<VoiceState> {
        self.slot(voice).map(|slot| slot.state)
    }

    /// Runs a playing voice to the end of its buffer, as if it had been rendered.
    #[cfg(test)]
    pub(crate) fn finish(&mut self, voice: VoiceHandle) -> Result<()> {
        let slot = self.slot_mut(voice)?;
        if slot.state == VoiceState::Playing {
            slot.state = VoiceState::Stopped;
            slot.cursor = 0;
        }
        Ok(())
    }

    /// Moves a voice, or stages the move while processing is suspended.
    pub fn set_position(&mut self, voice: VoiceHandle, position: Vec3) -> Result<()> {
        if self.is_suspended() {
            self.slot(voice)?;
            self.staged_positions.insert(voice, position);
        } else {
            self.slot_mut(voice)?.position = position;
        }
        Ok(())
    }

    /// Committed (audible) position of a voice.
    pub fn position(&self, voice: VoiceHandle) -> Result<Vec3> {
        self.slot(voice).map(|slot| slot.position)
    }

    pub fn offset_secs(&self, voice: VoiceHandle) -> Result<f32> {
        let slot = self.slot(voice)?;
        Ok(slot.cursor as f32 / slot.playback_rate as f32)
    }

    pub fn set_offset_secs(&mut self, voice: VoiceHandle, seconds: f32) -> Result<()> {
        let slot = self.slot_mut(voice)?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(OrbitSonicError::SpatialAudio(format!(
                "Invalid playback offset {} s",
                seconds
            )));
        }

        let frame = (seconds as f64 * slot.playback_rate as f64).round() as usize;
        if frame >= slot.samples.len() {
            return Err(OrbitSonicError::SpatialAudio(format!(
                "Playback offset {} s is past the end of {}",
                seconds, slot.buffer
            )));
        }
        slot.cursor = frame;
        Ok(())
    }

    pub fn suspend(&mut self) {
        self.suspend_depth += 1;
    }

    /// Leaves one level of suspension, committing staged positions at the outermost one.
    pub fn resume(&mut self) {
        if self.suspend_depth == 0 {
            return;
        }
        self.suspend_depth -= 1;
        if self.suspend_depth > 0 {
            return;
        }

        for (voice, position) in self.staged_positions.drain() {
            // Voices destroyed while suspended have already dropped their staged move
            if let Some(slot) = self.voices.get_mut(&voice) {
                slot.position = position;
            }
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_depth > 0
    }

    /// Renders `frames` mono samples for every playing voice into `out`,
    /// reusing its allocations. Voices that run out of samples stop.
    pub fn pull_block(&mut self, frames: usize, out: &mut Vec<RenderedVoice>) {
        let listener = self.listener;
        let mut used = 0;

        for (handle, slot) in self.voices.iter_mut() {
            if slot.state != VoiceState::Playing {
                continue;
            }

            let position = if slot.listener_relative {
                listener.position + listener.rotation * slot.position
            } else {
                slot.position
            };

            if used == out.len() {
                out.push(RenderedVoice {
                    voice: *handle,
                    position,
                    samples: Vec::with_capacity(frames),
                });
            }
            let rendered = &mut out[used];
            used += 1;

            rendered.voice = *handle;
            rendered.position = position;
            rendered.samples.clear();
            rendered.samples.resize(frames, 0.0);
            slot.advance_into(&mut rendered.samples);
        }

        out.truncate(used);
    }
}
