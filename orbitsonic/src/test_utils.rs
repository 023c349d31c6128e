//! In-memory collaborators for unit tests.

use crate::audio_data::{DecodedSound, PcmBuffer, SoundDecoder};
use crate::backend::{
    BufferHandle, BufferInfo, HrtfSelection, SpatialAudioBackend, VoiceHandle, VoiceState,
    VoiceTable,
};
use crate::config::VoiceConfig;
use crate::error::{OrbitSonicError, Result};
use crate::math::{Pose, Vec3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Sample rate of every buffer produced by [`ScriptedDecoder`]
pub const SCRIPTED_RATE: u32 = 1000;

/// A `set_voice_position` call as the backend saw it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionCall {
    pub voice: VoiceHandle,
    pub position: Vec3,
    /// Whether processing was suspended when the call arrived
    pub suspended: bool,
}

/// Backend double built on [`VoiceTable`]. Voices only end when a test
/// calls [`ScriptedBackend::finish_voice`].
pub struct ScriptedBackend {
    table: Mutex<VoiceTable>,
    hrtfs: Vec<String>,
    fail_open: AtomicBool,
    fail_offsets: AtomicBool,
    buffer_uploads_left: Mutex<Option<usize>>,
    position_calls: Mutex<Vec<PositionCall>>,
    open_requests: Mutex<Vec<String>>,
    close_count: AtomicUsize,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(VoiceTable::new()),
            hrtfs: Vec::new(),
            fail_open: AtomicBool::new(false),
            fail_offsets: AtomicBool::new(false),
            buffer_uploads_left: Mutex::new(None),
            position_calls: Mutex::new(Vec::new()),
            open_requests: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
        }
    }

    pub fn with_hrtfs(mut self, names: &[&str]) -> Self {
        self.hrtfs = names.iter().map(|name| name.to_string()).collect();
        self
    }

    /// An already opened backend.
    pub fn opened() -> Self {
        let backend = Self::new();
        backend.table().open();
        backend
    }

    fn table(&self) -> MutexGuard<'_, VoiceTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_offsets(&self, fail: bool) {
        self.fail_offsets.store(fail, Ordering::SeqCst);
    }

    /// Lets `count` more buffer uploads succeed, then fails the rest.
    pub fn fail_buffer_uploads_after(&self, count: usize) {
        *self
            .buffer_uploads_left
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(count);
    }

    /// Ends a playing voice as if its buffer ran out.
    pub fn finish_voice(&self, voice: VoiceHandle) {
        self.table().finish(voice).expect("finish scripted voice");
    }

    pub fn state(&self, voice: VoiceHandle) -> Option<VoiceState> {
        self.table().state(voice).ok()
    }

    pub fn voice_position(&self, voice: VoiceHandle) -> Option<Vec3> {
        self.table().position(voice).ok()
    }

    pub fn listener(&self) -> Pose {
        self.table().listener()
    }

    pub fn voice_count(&self) -> usize {
        self.table().voice_count()
    }

    pub fn buffer_count(&self) -> usize {
        self.table().buffer_count()
    }

    pub fn is_suspended(&self) -> bool {
        self.table().is_suspended()
    }

    pub fn position_calls(&self) -> Vec<PositionCall> {
        self.position_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_requests(&self) -> Vec<String> {
        self.open_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl SpatialAudioBackend for ScriptedBackend {
    fn open(&self, hrtf_preference: &str) -> Result<HrtfSelection> {
        self.open_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hrtf_preference.to_string());

        if self.fail_open.load(Ordering::SeqCst) {
            return Err(OrbitSonicError::AudioDevice("scripted open failure".into()));
        }

        let mut table = self.table();
        table.close();
        table.open();

        if self.hrtfs.iter().any(|name| name == hrtf_preference) {
            Ok(HrtfSelection::Named(hrtf_preference.to_string()))
        } else {
            if !hrtf_preference.is_empty() {
                log::warn!("HRTF \"{}\" is not available, using the default HRTF", hrtf_preference);
            }
            Ok(HrtfSelection::Default)
        }
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.table().close();
    }

    fn is_open(&self) -> bool {
        self.table().is_open()
    }

    fn available_hrtfs(&self) -> Vec<String> {
        self.hrtfs.clone()
    }

    fn set_listener(&self, pose: Pose) -> Result<()> {
        self.table().set_listener(pose)
    }

    fn create_buffer(&self, pcm: &PcmBuffer) -> Result<BufferHandle> {
        {
            let mut left = self
                .buffer_uploads_left
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match left.as_mut() {
                Some(0) => {
                    return Err(OrbitSonicError::SpatialAudio(
                        "scripted upload failure".into(),
                    ));
                }
                Some(count) => *count -= 1,
                None => {}
            }
        }

        self.table().insert_buffer(
            pcm.shared_samples(),
            pcm.sample_rate(),
            BufferInfo::from_pcm(pcm),
        )
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
        let mut table = self.table();
        let suspended = table.is_suspended();
        table.set_position(voice, position)?;
        self.position_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PositionCall {
                voice,
                position,
                suspended,
            });
        Ok(())
    }

    fn voice_offset(&self, voice: VoiceHandle) -> Result<f32> {
        if self.fail_offsets.load(Ordering::SeqCst) {
            return Err(OrbitSonicError::SpatialAudio("scripted offset failure".into()));
        }
        self.table().offset_secs(voice)
    }

    fn set_voice_offset(&self, voice: VoiceHandle, seconds: f32) -> Result<()> {
        if self.fail_offsets.load(Ordering::SeqCst) {
            return Err(OrbitSonicError::SpatialAudio("scripted offset failure".into()));
        }
        self.table().set_offset_secs(voice, seconds)
    }

    fn suspend_processing(&self) {
        self.table().suspend();
    }

    fn resume_processing(&self) {
        self.table().resume();
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Mono(f32),
    Stereo(f32),
    Fail,
}

/// Decoder double keyed by path. Unknown paths fail like missing files.
#[derive(Default)]
pub struct ScriptedDecoder {
    outcomes: Mutex<HashMap<PathBuf, Outcome>>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(self, path: &str, outcome: Outcome) -> Self {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(PathBuf::from(path), outcome);
        self
    }

    pub fn mono(self, path: &str, seconds: f32) -> Self {
        self.insert(path, Outcome::Mono(seconds))
    }

    pub fn stereo(self, path: &str, seconds: f32) -> Self {
        self.insert(path, Outcome::Stereo(seconds))
    }

    pub fn failing(self, path: &str) -> Self {
        self.insert(path, Outcome::Fail)
    }
}

fn tone(seconds: f32, level: f32) -> PcmBuffer {
    let frames = (seconds * SCRIPTED_RATE as f32).round() as usize;
    PcmBuffer::new(vec![level; frames], SCRIPTED_RATE)
}

impl SoundDecoder for ScriptedDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedSound> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied();

        match outcome {
            Some(Outcome::Mono(seconds)) => Ok(DecodedSound::mono(tone(seconds, 0.25))),
            Some(Outcome::Stereo(seconds)) => Ok(DecodedSound::stereo(
                tone(seconds, 0.25),
                tone(seconds, -0.25),
            )),
            Some(Outcome::Fail) => Err(OrbitSonicError::AudioLoading(format!(
                "scripted decode failure for {}",
                path.display()
            ))),
            None => Err(OrbitSonicError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))),
        }
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Installs the test logger once; `RUST_LOG` controls verbosity.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
