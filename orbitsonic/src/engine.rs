use crate::audio_data::{SoundDecoder, SymphoniaDecoder};
use crate::backend::{SpatialAudioBackend, SteamAudioBackend};
use crate::callback::{CallbackSlot, SoundFinishedCallback};
use crate::config::OrbitSonicEngineDesc;
use crate::error::Result;
use crate::events::OrbitSonicEvent;
use crate::math::{self, Pose};
use crate::playback::{FinishedHook, MonitorSupervisor, PlaybackInstance};
use crate::sound_id::SoundId;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// State shared between the engine handle and completion monitors.
///
/// Monitors only hold a `Weak` reference, so they never keep a dropped
/// engine alive.
struct EngineShared {
    desc: OrbitSonicEngineDesc,
    backend: Arc<dyn SpatialAudioBackend>,
    decoder: Arc<dyn SoundDecoder>,
    sounds: Mutex<HashMap<SoundId, PlaybackInstance>>,
    initialized: AtomicBool,
    /// Bumped whenever a session is torn down; sounds loaded across a bump are discarded
    generation: AtomicU64,
    /// f32 bits of the stereo separation in radians
    stereo_angle: AtomicU32,
    callback: CallbackSlot,
    monitors: MonitorSupervisor,
    event_sender: Sender<OrbitSonicEvent>,
    event_receiver: Receiver<OrbitSonicEvent>,
}

impl EngineShared {
    fn sounds(&self) -> MutexGuard<'_, HashMap<SoundId, PlaybackInstance>> {
        self.sounds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: OrbitSonicEvent) {
        match self.event_sender.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(event)) => {
                log::trace!("Event queue full, dropping {:?}", event);
            }
        }
    }

    /// Inserts a freshly loaded sound unless the session it was loaded in has
    /// since been torn down, in which case the instance is handed back.
    fn register(
        &self,
        instance: PlaybackInstance,
        generation: u64,
    ) -> std::result::Result<(), PlaybackInstance> {
        let mut sounds = self.sounds();
        if !self.initialized.load(Ordering::Acquire)
            || self.generation.load(Ordering::Acquire) != generation
        {
            return Err(instance);
        }
        sounds.insert(instance.id().clone(), instance);
        Ok(())
    }

    /// Reaps a sound whose primary voice ended on its own.
    ///
    /// Runs on the sound's monitor thread. Removal and notification are
    /// ordered so that a sound stopped by the host in the meantime is never
    /// reported, and a finished sound is reported exactly once.
    fn on_sound_finished(&self, sound_id: &SoundId) {
        let removed = self.sounds().remove(sound_id);
        let Some(instance) = removed else {
            log::debug!("Sound {} was stopped before its completion was handled", sound_id);
            return;
        };

        self.callback.notify(sound_id);
        self.emit(OrbitSonicEvent::SoundFinished {
            sound_id: sound_id.clone(),
        });
        drop(instance);
    }

    /// Stops and evicts every sound, then waits for their monitors.
    fn stop_everything(&self) {
        let drained: Vec<(SoundId, PlaybackInstance)> = self.sounds().drain().collect();
        for (sound_id, mut instance) in drained {
            instance.stop();
            self.emit(OrbitSonicEvent::SoundStopped { sound_id });
        }
        self.monitors.join_all();
    }
}

/// Moving-sound engine: sounds orbit a single listener and report when they
/// finish on their own.
///
/// The engine keeps a registry of loaded sounds behind one lock. Every method
/// takes `&self`, so the engine can be shared between threads (for example in
/// an `Arc`). Methods addressing a sound that is not registered log a warning
/// and do nothing, or return a sentinel value.
///
/// # Example
///
/// ```ignore
/// use orbitsonic::{OrbitSonicEngine, OrbitSonicEngineDesc};
///
/// let engine = OrbitSonicEngine::with_defaults(OrbitSonicEngineDesc::default())?;
/// if engine.initialize("") {
///     let id = engine.create_sound("rain.wav");
///     engine.set_sound_position(&id, 0.0, 2.0, 0.0);
///     engine.play_sound(&id);
/// }
/// ```
pub struct OrbitSonicEngine {
    shared: Arc<EngineShared>,
}

impl OrbitSonicEngine {
    /// Creates an uninitialized engine on top of the given collaborators.
    pub fn new(
        desc: OrbitSonicEngineDesc,
        backend: Arc<dyn SpatialAudioBackend>,
        decoder: Arc<dyn SoundDecoder>,
    ) -> Self {
        let (event_sender, event_receiver) = bounded(desc.event_capacity);
        let monitors = MonitorSupervisor::new(desc.poll_interval);
        let stereo_angle = AtomicU32::new(desc.initial_stereo_angle.to_bits());

        Self {
            shared: Arc::new(EngineShared {
                desc,
                backend,
                decoder,
                sounds: Mutex::new(HashMap::new()),
                initialized: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                stereo_angle,
                callback: CallbackSlot::new(),
                monitors,
                event_sender,
                event_receiver,
            }),
        }
    }

    /// Creates an engine rendering through [`SteamAudioBackend`] and decoding
    /// with [`SymphoniaDecoder`].
    pub fn with_defaults(desc: OrbitSonicEngineDesc) -> Result<Self> {
        let backend = SteamAudioBackend::new(desc.backend.clone())?;
        Ok(Self::new(desc, Arc::new(backend), Arc::new(SymphoniaDecoder)))
    }

    pub fn desc(&self) -> &OrbitSonicEngineDesc {
        &self.shared.desc
    }

    /// Opens the audio backend and places the listener at the origin facing forward.
    ///
    /// Calling this on an initialized engine first stops every sound and
    /// closes the previous session. The finished-sound callback is kept.
    ///
    /// # Arguments
    ///
    /// * `hrtf_preference` - Name of the HRTF profile to use. Empty or unknown
    ///   names fall back to the backend's default HRTF.
    ///
    /// # Returns
    ///
    /// `true` if the engine is ready to create sounds
    pub fn initialize(&self, hrtf_preference: &str) -> bool {
        let shared = &self.shared;

        shared.generation.fetch_add(1, Ordering::AcqRel);
        if shared.initialized.swap(false, Ordering::AcqRel) {
            log::info!("Re-initializing OrbitSonic engine");
            shared.stop_everything();
            shared.backend.close();
        }

        let selection = match shared.backend.open(hrtf_preference) {
            Ok(selection) => selection,
            Err(e) => {
                log::error!("Failed to open the spatial audio backend: {}", e);
                return false;
            }
        };

        if let Err(e) = shared.backend.set_listener(Pose::identity()) {
            log::error!("Failed to configure the listener: {}", e);
            shared.backend.close();
            return false;
        }

        shared.initialized.store(true, Ordering::Release);
        log::info!("OrbitSonic engine initialized with {}", selection);
        shared.emit(OrbitSonicEvent::EngineInitialized { hrtf: selection });
        true
    }

    /// Stops every sound, waits for their monitors, closes the backend and
    /// releases the callback. Safe to call in any state and more than once.
    pub fn cleanup(&self) {
        let shared = &self.shared;
        shared.generation.fetch_add(1, Ordering::AcqRel);
        let was_initialized = shared.initialized.swap(false, Ordering::AcqRel);

        shared.stop_everything();
        shared.backend.close();
        shared.callback.release();

        if was_initialized {
            log::info!("OrbitSonic engine shut down");
            shared.emit(OrbitSonicEvent::EngineShutdown);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    /// Names accepted by [`initialize`](Self::initialize).
    pub fn available_hrtfs(&self) -> Vec<String> {
        self.shared.backend.available_hrtfs()
    }

    /// Loads a sound and registers it, idle, in front of the listener.
    ///
    /// # Returns
    ///
    /// The new sound's id, or an empty id if the engine is not initialized or
    /// the file could not be loaded.
    pub fn create_sound(&self, path: impl AsRef<Path>) -> SoundId {
        let path = path.as_ref();
        let shared = &self.shared;

        let generation = shared.generation.load(Ordering::Acquire);
        if !self.is_initialized() {
            log::warn!(
                "Cannot create a sound from {}: engine is not initialized",
                path.display()
            );
            return SoundId::empty();
        }

        let sound_id = SoundId::generate(path);
        let instance = match PlaybackInstance::load(
            sound_id.clone(),
            path,
            shared.decoder.as_ref(),
            shared.backend.clone(),
            shared.desc.voice,
        ) {
            Ok(instance) => instance,
            Err(e) => {
                log::error!("Failed to create a sound from {}: {}", path.display(), e);
                return SoundId::empty();
            }
        };

        if let Err(stale) = shared.register(instance, generation) {
            log::warn!(
                "Discarding sound {}: the engine was shut down while it loaded",
                sound_id
            );
            drop(stale);
            return SoundId::empty();
        }
        log::debug!("Created sound {}", sound_id);
        shared.emit(OrbitSonicEvent::SoundCreated {
            sound_id: sound_id.clone(),
        });
        sound_id
    }

    fn finished_hook(&self, sound_id: &SoundId) -> FinishedHook {
        let shared: Weak<EngineShared> = Arc::downgrade(&self.shared);
        let sound_id = sound_id.clone();
        Box::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.on_sound_finished(&sound_id);
            }
        })
    }

    /// Runs `f` on a registered sound while holding the registry lock.
    fn with_sound<R>(
        &self,
        sound_id: &SoundId,
        operation: &str,
        f: impl FnOnce(&mut PlaybackInstance) -> R,
    ) -> Option<R> {
        let mut sounds = self.shared.sounds();
        match sounds.get_mut(sound_id) {
            Some(instance) => Some(f(instance)),
            None => {
                log::warn!("Cannot {}: unknown sound {:?}", operation, sound_id.as_str());
                None
            }
        }
    }

    /// Starts a sound. Does nothing if it is already playing or paused.
    pub fn play_sound(&self, sound_id: &SoundId) {
        let hook = self.finished_hook(sound_id);
        let started = self.with_sound(sound_id, "play", |instance| {
            if instance.is_playing() {
                return false;
            }
            match instance.play(&self.shared.monitors, hook) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to play sound {}: {}", sound_id, e);
                    false
                }
            }
        });

        if started == Some(true) {
            log::debug!("Playing sound {}", sound_id);
            self.shared.emit(OrbitSonicEvent::SoundStarted {
                sound_id: sound_id.clone(),
            });
        }
    }

    /// Stops a sound and removes it. The finished-sound callback is not invoked.
    pub fn stop_sound(&self, sound_id: &SoundId) {
        let mut sounds = self.shared.sounds();
        let Some(mut instance) = sounds.remove(sound_id) else {
            log::warn!("Cannot stop: unknown sound {:?}", sound_id.as_str());
            return;
        };
        instance.stop();
        drop(sounds);

        log::debug!("Stopped sound {}", sound_id);
        self.shared.emit(OrbitSonicEvent::SoundStopped {
            sound_id: sound_id.clone(),
        });
    }

    /// Pauses a playing sound. A paused sound never counts as finished.
    pub fn pause_sound(&self, sound_id: &SoundId) {
        let paused = self.with_sound(sound_id, "pause", |instance| {
            let playing = instance.is_playing();
            instance.pause();
            playing
        });

        if paused == Some(true) {
            self.shared.emit(OrbitSonicEvent::SoundPaused {
                sound_id: sound_id.clone(),
            });
        }
    }

    pub fn resume_sound(&self, sound_id: &SoundId) {
        let resumed = self.with_sound(sound_id, "resume", |instance| {
            let playing = instance.is_playing();
            instance.resume();
            playing
        });

        if resumed == Some(true) {
            self.shared.emit(OrbitSonicEvent::SoundResumed {
                sound_id: sound_id.clone(),
            });
        }
    }

    /// Places a sound on its orbit around the listener.
    ///
    /// # Arguments
    ///
    /// * `angle` - Position on the circle in radians, any value (normalized to `(-PI, PI]`)
    /// * `radius` - Distance from the listener in the horizontal plane
    /// * `height` - Offset along the vertical axis
    ///
    /// The voices of a stereo sound are spread by [`stereo_angle`](Self::stereo_angle)
    /// around `angle`.
    pub fn set_sound_position(&self, sound_id: &SoundId, angle: f32, radius: f32, height: f32) {
        let separation = self.stereo_angle();
        self.with_sound(sound_id, "set position", |instance| {
            instance.update_position(angle, radius, height, separation);
        });
    }

    /// Places a sound at a listener-relative Cartesian position.
    pub fn set_sound_position_cartesian(&self, sound_id: &SoundId, x: f32, y: f32, z: f32) {
        let (angle, radius, height) = math::cartesian_to_polar(math::Vec3::new(x, y, z));
        self.set_sound_position(sound_id, angle, radius, height);
    }

    /// Seeks every voice of a sound to `seconds`.
    pub fn set_playback_time(&self, sound_id: &SoundId, seconds: f32) {
        self.with_sound(sound_id, "seek", |instance| {
            instance.set_playback_time(seconds);
        });
    }

    /// Playback offset in seconds, or `-1.0` if the sound is unknown or the
    /// offset cannot be read.
    pub fn get_playback_time(&self, sound_id: &SoundId) -> f32 {
        self.with_sound(sound_id, "read playback time", |instance| {
            instance.playback_time()
        })
        .unwrap_or(-1.0)
    }

    /// Length in seconds, or `0.0` if the sound is unknown.
    pub fn get_sound_duration(&self, sound_id: &SoundId) -> f32 {
        self.with_sound(sound_id, "read duration", |instance| instance.duration())
            .unwrap_or(0.0)
    }

    /// Stops and removes every sound.
    pub fn stop_all_sounds(&self) {
        let drained: Vec<(SoundId, PlaybackInstance)> = self.shared.sounds().drain().collect();
        if !drained.is_empty() {
            log::debug!("Stopping {} sound(s)", drained.len());
        }
        for (sound_id, mut instance) in drained {
            instance.stop();
            self.shared.emit(OrbitSonicEvent::SoundStopped { sound_id });
        }
    }

    /// Sets the separation in radians between the two voices of stereo sounds.
    ///
    /// Applies from the next position update of each sound.
    pub fn set_stereo_angle(&self, radians: f32) {
        self.shared
            .stereo_angle
            .store(radians.to_bits(), Ordering::Relaxed);
    }

    pub fn stereo_angle(&self) -> f32 {
        f32::from_bits(self.shared.stereo_angle.load(Ordering::Relaxed))
    }

    /// Registers the callback for sounds that finish on their own, replacing
    /// any previous one.
    pub fn set_callback(&self, callback: impl SoundFinishedCallback + 'static) {
        self.shared.callback.set(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        self.shared.callback.release();
    }

    /// Ids of every registered sound, in no particular order.
    pub fn active_sound_ids(&self) -> Vec<SoundId> {
        self.shared.sounds().keys().cloned().collect()
    }

    pub fn sound_count(&self) -> usize {
        self.shared.sounds().len()
    }

    /// Whether a sound is registered and has an active (possibly paused) session.
    pub fn is_sound_playing(&self, sound_id: &SoundId) -> bool {
        self.shared
            .sounds()
            .get(sound_id)
            .is_some_and(|instance| instance.is_playing())
    }

    pub fn is_sound_stereo(&self, sound_id: &SoundId) -> bool {
        self.shared
            .sounds()
            .get(sound_id)
            .is_some_and(|instance| instance.has_stereo())
    }

    /// Drains the events emitted since the last call.
    ///
    /// At most [`OrbitSonicEngineDesc::event_capacity`] events are kept; newer
    /// ones are dropped until the host polls again.
    pub fn poll_events(&self) -> Vec<OrbitSonicEvent> {
        self.shared.event_receiver.try_iter().collect()
    }
}

impl Drop for OrbitSonicEngine {
    fn drop(&mut self) {
        self.cleanup();
    }
}
