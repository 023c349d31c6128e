//! Default backend: cpal output with Steam Audio (audionimbus) HRTF rendering.

mod hrtf;
mod output;
mod processor;
mod renderer;

use crate::audio_data::{BatchResampler, PcmBuffer};
use crate::backend::hrtf_catalog;
use crate::backend::{
    BufferHandle, BufferInfo, HrtfSelection, SpatialAudioBackend, VoiceHandle, VoiceState,
    VoiceTable,
};
use crate::config::{SteamBackendDesc, VoiceConfig};
use crate::error::{OrbitSonicError, Result};
use crate::math::{Pose, Vec3};
use output::OutputDevice;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Spatial backend rendering every voice binaurally to the default output device.
///
/// Buffers are resampled to [`SteamBackendDesc::sample_rate`] on upload. Named
/// HRTFs are the `*.sofa` files in [`SteamBackendDesc::hrtf_dir`].
pub struct SteamAudioBackend {
    desc: SteamBackendDesc,
    table: Arc<Mutex<VoiceTable>>,
    device: Mutex<Option<OutputDevice>>,
}

impl SteamAudioBackend {
    pub fn new(desc: SteamBackendDesc) -> Result<Self> {
        if desc.sample_rate == 0 {
            return Err(OrbitSonicError::Configuration(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if desc.frame_size == 0 {
            return Err(OrbitSonicError::Configuration(
                "Frame size must be greater than 0".to_string(),
            ));
        }
        if desc.channels == 0 {
            return Err(OrbitSonicError::Configuration(
                "Output needs at least one channel".to_string(),
            ));
        }

        Ok(Self {
            desc,
            table: Arc::new(Mutex::new(VoiceTable::new())),
            device: Mutex::new(None),
        })
    }

    pub fn desc(&self) -> &SteamBackendDesc {
        &self.desc
    }

    fn table(&self) -> MutexGuard<'_, VoiceTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device(&self) -> MutexGuard<'_, Option<OutputDevice>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SpatialAudioBackend for SteamAudioBackend {
    fn open(&self, hrtf_preference: &str) -> Result<HrtfSelection> {
        let mut device = self.device();
        if let Some(mut previous) = device.take() {
            log::debug!("Reopening Steam Audio backend");
            previous.shutdown();
            self.table().close();
        }

        let profiles = hrtf_catalog::scan(self.desc.hrtf_dir.as_deref());
        let profile = hrtf_catalog::resolve(&profiles, hrtf_preference).cloned();

        let (output, selection) = OutputDevice::start(&self.desc, profile, self.table.clone())?;
        self.table().open();
        *device = Some(output);

        log::info!("Steam Audio backend opened with {}", selection);
        Ok(selection)
    }

    fn close(&self) {
        let mut device = self.device();
        if let Some(mut output) = device.take() {
            output.shutdown();
            log::info!("Steam Audio backend closed");
        }
        self.table().close();
    }

    fn is_open(&self) -> bool {
        self.table().is_open()
    }

    fn available_hrtfs(&self) -> Vec<String> {
        hrtf_catalog::scan(self.desc.hrtf_dir.as_deref())
            .into_iter()
            .map(|profile| profile.name)
            .collect()
    }

    fn set_listener(&self, pose: Pose) -> Result<()> {
        self.table().set_listener(pose)
    }

    fn create_buffer(&self, pcm: &PcmBuffer) -> Result<BufferHandle> {
        if !self.is_open() {
            return Err(OrbitSonicError::BackendClosed);
        }

        let info = BufferInfo::from_pcm(pcm);
        // Resample outside the table lock so the audio thread keeps rendering
        let samples = if pcm.sample_rate() == self.desc.sample_rate {
            pcm.shared_samples()
        } else {
            let resampler = BatchResampler::new(
                pcm.sample_rate(),
                self.desc.sample_rate,
                Some(self.desc.frame_size),
            )?;
            resampler.resample(pcm)?.shared_samples()
        };

        self.table()
            .insert_buffer(samples, self.desc.sample_rate, info)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) -> Result<()> {
        self.table().remove_buffer(buffer)
    }

    fn buffer_info(&self, buffer: BufferHandle) -> Result<BufferInfo> {
        self.table().buffer_info(buffer)
    }

    fn create_voice(&self, buffer: BufferHandle, config: VoiceConfig) -> Result<VoiceHandle> {
        self.table().create_voice(buffer, config)
    }

    fn destroy_voice(&self, voice: VoiceHandle) -> Result<()> {
        self.table().remove_voice(voice)
    }

    fn play_voice(&self, voice: VoiceHandle) -> Result<()> {
        self.table().play(voice)
    }

    fn pause_voice(&self, voice: VoiceHandle) -> Result<()> {
        self.table().pause(voice)
    }

    fn stop_voice(&self, voice: VoiceHandle) -> Result<()> {
        self.table().stop(voice)
    }

    fn voice_state(&self, voice: VoiceHandle) -> Result<VoiceState> {
        self.table().state(voice)
    }

    fn set_voice_position(&self, voice: VoiceHandle, position: Vec3) -> Result<()> {
        self.table().set_position(voice, position)
    }

    fn voice_offset(&self, voice: VoiceHandle) -> Result<f32> {
        self.table().offset_secs(voice)
    }

    fn set_voice_offset(&self, voice: VoiceHandle, seconds: f32) -> Result<()> {
        self.table().set_offset_secs(voice, seconds)
    }

    fn suspend_processing(&self) {
        self.table().suspend();
    }

    fn resume_processing(&self) {
        self.table().resume();
    }
}

impl Drop for SteamAudioBackend {
    fn drop(&mut self) {
        self.close();
    }
}
