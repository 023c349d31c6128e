//! One loaded sound and its lifecycle.
//!
//! A [`PlaybackInstance`] owns the backend buffers and voices for a sound: one
//! voice for mono sources, a left and a right voice for stereo sources. The
//! instance is created idle, plays and pauses any number of times and is
//! released by [`PlaybackInstance::stop`], which also runs on drop.

mod monitor;

pub use monitor::{FinishedHook, MonitorHandle, MonitorSupervisor};

use crate::audio_data::SoundDecoder;
use crate::backend::{BufferHandle, SpatialAudioBackend, VoiceHandle};
use crate::config::VoiceConfig;
use crate::error::{OrbitSonicError, Result};
use crate::math::{self, Vec3};
use crate::sound_id::SoundId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A primary handle and, for stereo sounds, a secondary one.
///
/// `None` marks a handle that was never created or has been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlePair<H> {
    pub primary: Option<H>,
    pub secondary: Option<H>,
}

impl<H: Copy> HandlePair<H> {
    pub fn empty() -> Self {
        Self {
            primary: None,
            secondary: None,
        }
    }

    /// Populated handles, primary first
    pub fn iter(&self) -> impl Iterator<Item = H> {
        self.primary.into_iter().chain(self.secondary)
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    fn take(&mut self) -> Self {
        std::mem::replace(self, Self::empty())
    }
}

pub type VoicePair = HandlePair<VoiceHandle>;
pub type BufferPair = HandlePair<BufferHandle>;

/// A loaded sound bound to backend voices.
pub struct PlaybackInstance {
    id: SoundId,
    path: PathBuf,
    backend: Arc<dyn SpatialAudioBackend>,
    voices: VoicePair,
    buffers: BufferPair,
    duration: f32,
    session: Arc<AtomicBool>,
    monitor: Option<MonitorHandle>,
}

impl PlaybackInstance {
    /// Decodes `path` and uploads it as one (mono) or two (stereo) voices.
    ///
    /// On failure every buffer and voice created so far is released again.
    pub fn load(
        id: SoundId,
        path: &Path,
        decoder: &dyn SoundDecoder,
        backend: Arc<dyn SpatialAudioBackend>,
        voice_config: VoiceConfig,
    ) -> Result<Self> {
        let decoded = decoder.decode(path)?;
        if decoded.primary.is_empty() {
            return Err(OrbitSonicError::AudioLoading(format!(
                "{} decoded to no samples",
                path.display()
            )));
        }

        // Built empty first so an early return releases partial state in Drop
        let mut instance = Self {
            id,
            path: path.to_path_buf(),
            backend: backend.clone(),
            voices: VoicePair::empty(),
            buffers: BufferPair::empty(),
            duration: 0.0,
            session: Arc::new(AtomicBool::new(false)),
            monitor: None,
        };

        let primary_buffer = backend.create_buffer(&decoded.primary)?;
        instance.buffers.primary = Some(primary_buffer);
        if let Some(right) = &decoded.secondary {
            instance.buffers.secondary = Some(backend.create_buffer(right)?);
        }

        instance.voices.primary = Some(backend.create_voice(primary_buffer, voice_config)?);
        if let Some(secondary_buffer) = instance.buffers.secondary {
            instance.voices.secondary =
                Some(backend.create_voice(secondary_buffer, voice_config)?);
        }

        instance.duration = backend.buffer_info(primary_buffer)?.duration_secs();

        log::debug!(
            "Loaded {} from {} ({}, {:.3} s)",
            instance.id,
            instance.path.display(),
            if instance.has_stereo() { "stereo" } else { "mono" },
            instance.duration
        );
        Ok(instance)
    }

    pub fn id(&self) -> &SoundId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the sound in seconds, fixed at load time.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn voices(&self) -> VoicePair {
        self.voices
    }

    pub fn buffers(&self) -> BufferPair {
        self.buffers
    }

    /// Whether a playback session is active. Stays true while paused.
    pub fn is_playing(&self) -> bool {
        self.session.load(Ordering::Acquire)
    }

    pub fn has_stereo(&self) -> bool {
        self.buffers.secondary.is_some()
    }

    /// Starts every voice and a completion monitor. Does nothing if a session
    /// is already active.
    ///
    /// `on_finished` runs on the monitor thread once the primary voice ends on
    /// its own; it is dropped unused if the session is stopped first.
    pub fn play(
        &mut self,
        supervisor: &MonitorSupervisor,
        on_finished: FinishedHook,
    ) -> Result<()> {
        let Some(primary) = self.voices.primary else {
            return Err(OrbitSonicError::Engine(format!(
                "Sound {} has been released",
                self.id
            )));
        };

        if self
            .session
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        for voice in self.voices.iter() {
            if let Err(e) = self.backend.play_voice(voice) {
                log::warn!("Failed to start {} of {}: {}", voice, self.id, e);
            }
        }

        match supervisor.spawn(
            &self.id,
            self.session.clone(),
            primary,
            self.backend.clone(),
            on_finished,
        ) {
            Ok(handle) => {
                self.monitor = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.session.store(false, Ordering::Release);
                for voice in self.voices.iter() {
                    let _ = self.backend.stop_voice(voice);
                }
                Err(e)
            }
        }
    }

    /// Ends the session and releases every voice and buffer. Safe to repeat.
    pub fn stop(&mut self) {
        // Cleared first so a monitor that is mid-poll does not report completion
        self.session.store(false, Ordering::Release);
        if let Some(mut monitor) = self.monitor.take() {
            monitor.cancel();
        }

        for voice in self.voices.take().iter() {
            if let Err(e) = self.backend.stop_voice(voice) {
                log::warn!("Failed to stop {} of {}: {}", voice, self.id, e);
            }
            if let Err(e) = self.backend.destroy_voice(voice) {
                log::warn!("Failed to destroy {} of {}: {}", voice, self.id, e);
            }
        }

        for buffer in self.buffers.take().iter() {
            if let Err(e) = self.backend.destroy_buffer(buffer) {
                log::warn!("Failed to destroy {} of {}: {}", buffer, self.id, e);
            }
        }
    }

    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        for voice in self.voices.iter() {
            if let Err(e) = self.backend.pause_voice(voice) {
                log::warn!("Failed to pause {} of {}: {}", voice, self.id, e);
            }
        }
    }

    pub fn resume(&mut self) {
        if !self.is_playing() {
            return;
        }
        for voice in self.voices.iter() {
            if let Err(e) = self.backend.play_voice(voice) {
                log::warn!("Failed to resume {} of {}: {}", voice, self.id, e);
            }
        }
    }

    /// Places the sound on its orbit.
    ///
    /// Mono sounds sit at `angle`. The two voices of a stereo sound sit at
    /// `angle - stereo_separation / 2` (left) and `angle + stereo_separation / 2`
    /// (right). All voices move within one suspended backend update.
    pub fn update_position(
        &mut self,
        angle: f32,
        radius: f32,
        height: f32,
        stereo_separation: f32,
    ) {
        let targets: Vec<(VoiceHandle, Vec3)> = match (self.voices.primary, self.voices.secondary) {
            (Some(primary), None) => {
                vec![(primary, math::polar_to_cartesian(angle, radius, height))]
            }
            (Some(left), Some(right)) => {
                let (left_angle, right_angle) = math::stereo_angles(angle, stereo_separation);
                vec![
                    (left, math::polar_to_cartesian(left_angle, radius, height)),
                    (right, math::polar_to_cartesian(right_angle, radius, height)),
                ]
            }
            _ => return,
        };

        self.backend.suspend_processing();
        for (voice, position) in targets {
            if let Err(e) = self.backend.set_voice_position(voice, position) {
                log::warn!("Failed to move {} of {}: {}", voice, self.id, e);
            }
        }
        self.backend.resume_processing();
    }

    /// Seeks every voice to `seconds`.
    pub fn set_playback_time(&mut self, seconds: f32) {
        for voice in self.voices.iter() {
            if let Err(e) = self.backend.set_voice_offset(voice, seconds) {
                log::warn!("Failed to seek {} of {}: {}", voice, self.id, e);
            }
        }
    }

    /// Playback offset of the primary voice in seconds, or `-1.0` if it cannot be read.
    pub fn playback_time(&self) -> f32 {
        let Some(primary) = self.voices.primary else {
            return -1.0;
        };
        match self.backend.voice_offset(primary) {
            Ok(seconds) => seconds,
            Err(e) => {
                log::warn!("Failed to read the offset of {}: {}", self.id, e);
                -1.0
            }
        }
    }
}

impl Drop for PlaybackInstance {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VoiceState;
    use crate::test_utils::{ScriptedBackend, ScriptedDecoder, wait_until};
    use crossbeam_channel::unbounded;
    use std::f32::consts::PI;
    use std::time::Duration;

    fn load(
        decoder: &ScriptedDecoder,
        backend: &Arc<ScriptedBackend>,
        path: &str,
    ) -> Result<PlaybackInstance> {
        PlaybackInstance::load(
            SoundId::generate(Path::new(path)),
            Path::new(path),
            decoder,
            backend.clone(),
            VoiceConfig::default(),
        )
    }

    fn silent_hook() -> FinishedHook {
        Box::new(|| {})
    }

    #[test]
    fn mono_load_creates_one_voice() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().mono("tone.wav", 2.0);

        let instance = load(&decoder, &backend, "tone.wav").unwrap();

        assert!(!instance.has_stereo());
        assert!(!instance.is_playing());
        assert_eq!(instance.voices().count(), 1);
        assert_eq!(instance.buffers().count(), 1);
        assert!((instance.duration() - 2.0).abs() < 1e-4);
        let voice = instance.voices().primary.unwrap();
        assert_eq!(backend.state(voice), Some(VoiceState::Initial));
        assert_eq!(backend.voice_position(voice), Some(Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn stereo_load_creates_two_voices() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().stereo("music.flac", 1.5);

        let instance = load(&decoder, &backend, "music.flac").unwrap();

        assert!(instance.has_stereo());
        assert_eq!(instance.voices().count(), 2);
        assert_eq!(instance.buffers().count(), 2);
        assert!((instance.duration() - 1.5).abs() < 1e-4);
    }

    #[test]
    fn failed_load_leaves_no_backend_resources() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new()
            .failing("broken.wav")
            .stereo("music.flac", 1.0);

        assert!(load(&decoder, &backend, "broken.wav").is_err());
        assert!(load(&decoder, &backend, "missing.wav").is_err());

        backend.fail_buffer_uploads_after(1);
        assert!(load(&decoder, &backend, "music.flac").is_err());

        assert_eq!(backend.voice_count(), 0);
        assert_eq!(backend.buffer_count(), 0);
    }

    #[test]
    fn play_pause_resume_keep_the_session() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().stereo("music.flac", 1.0);
        let supervisor = MonitorSupervisor::new(Duration::from_millis(5));
        let mut instance = load(&decoder, &backend, "music.flac").unwrap();

        // Not playing yet: pause and resume do nothing
        instance.pause();
        instance.resume();
        assert!(instance.voices().iter().all(|v| backend.state(v) == Some(VoiceState::Initial)));

        instance.play(&supervisor, silent_hook()).unwrap();
        assert!(instance.is_playing());
        assert!(instance.voices().iter().all(|v| backend.state(v) == Some(VoiceState::Playing)));

        instance.pause();
        assert!(instance.is_playing());
        assert!(instance.voices().iter().all(|v| backend.state(v) == Some(VoiceState::Paused)));

        instance.resume();
        assert!(instance.voices().iter().all(|v| backend.state(v) == Some(VoiceState::Playing)));

        // A second play while active starts no second monitor
        instance.play(&supervisor, silent_hook()).unwrap();
        assert_eq!(supervisor.active_count(), 1);
    }

    #[test]
    fn stop_releases_everything_and_is_idempotent() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().stereo("music.flac", 1.0);
        let supervisor = MonitorSupervisor::new(Duration::from_secs(60));
        let mut instance = load(&decoder, &backend, "music.flac").unwrap();

        instance.play(&supervisor, silent_hook()).unwrap();
        instance.stop();

        assert!(!instance.is_playing());
        assert_eq!(instance.voices(), VoicePair::empty());
        assert_eq!(instance.buffers(), BufferPair::empty());
        assert_eq!(backend.voice_count(), 0);
        assert_eq!(backend.buffer_count(), 0);
        assert_eq!(instance.playback_time(), -1.0);

        instance.stop();
        // The monitor was cancelled, so it exits long before its interval
        assert!(wait_until(Duration::from_secs(2), || supervisor.active_count() == 0));
    }

    #[test]
    fn dropping_an_instance_releases_it() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().mono("tone.wav", 1.0);

        let instance = load(&decoder, &backend, "tone.wav").unwrap();
        assert_eq!(backend.voice_count(), 1);
        drop(instance);

        assert_eq!(backend.voice_count(), 0);
        assert_eq!(backend.buffer_count(), 0);
    }

    #[test]
    fn stereo_voices_straddle_the_center_angle_in_one_bracket() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().stereo("music.flac", 1.0);
        let mut instance = load(&decoder, &backend, "music.flac").unwrap();

        instance.update_position(0.0, 2.0, 0.5, PI / 2.0);

        let calls = backend.position_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|call| call.suspended));
        assert!(!backend.is_suspended());

        let voices = instance.voices();
        let left = backend.voice_position(voices.primary.unwrap()).unwrap();
        let right = backend.voice_position(voices.secondary.unwrap()).unwrap();
        let expected_left = math::polar_to_cartesian(-PI / 4.0, 2.0, 0.5);
        let expected_right = math::polar_to_cartesian(PI / 4.0, 2.0, 0.5);
        assert!((left - expected_left).length() < 1e-5);
        assert!((right - expected_right).length() < 1e-5);
    }

    #[test]
    fn mono_voice_sits_at_the_polar_position() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().mono("tone.wav", 1.0);
        let mut instance = load(&decoder, &backend, "tone.wav").unwrap();

        instance.update_position(PI / 2.0, 3.0, -1.0, PI / 6.0);

        let position = backend
            .voice_position(instance.voices().primary.unwrap())
            .unwrap();
        assert!((position - Vec3::new(0.0, -1.0, 3.0)).length() < 1e-5);
        assert_eq!(backend.position_calls().len(), 1);
    }

    #[test]
    fn playback_time_round_trips_and_reports_errors() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().stereo("music.flac", 2.0);
        let mut instance = load(&decoder, &backend, "music.flac").unwrap();

        instance.set_playback_time(1.25);
        assert!((instance.playback_time() - 1.25).abs() < 1e-3);

        backend.set_fail_offsets(true);
        assert_eq!(instance.playback_time(), -1.0);
        // Seeking failures are logged, not fatal
        instance.set_playback_time(0.5);
    }

    #[test]
    fn natural_end_runs_the_hook() {
        let backend = Arc::new(ScriptedBackend::opened());
        let decoder = ScriptedDecoder::new().mono("tone.wav", 1.0);
        let supervisor = MonitorSupervisor::new(Duration::from_millis(5));
        let mut instance = load(&decoder, &backend, "tone.wav").unwrap();
        let (tx, rx) = unbounded();

        instance
            .play(
                &supervisor,
                Box::new(move || {
                    let _ = tx.send(());
                }),
            )
            .unwrap();
        backend.finish_voice(instance.voices().primary.unwrap());

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }
}
