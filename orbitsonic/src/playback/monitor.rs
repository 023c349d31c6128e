//! Completion monitors.
//!
//! Every playing sound gets one monitor thread that polls its primary voice
//! and reports natural completion exactly once. The [`MonitorSupervisor`] owns
//! the threads so the engine can join them on cleanup.

use crate::backend::{SpatialAudioBackend, VoiceHandle, VoiceState};
use crate::error::Result;
use crate::sound_id::SoundId;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Invoked by a monitor when its sound finished while still active.
pub type FinishedHook = Box<dyn FnOnce() + Send + 'static>;

/// Cancels a monitor's wait when dropped or cancelled.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: Option<Sender<()>>,
}

impl MonitorHandle {
    pub fn cancel(&mut self) {
        self.cancel.take();
    }
}

/// Owns the monitor threads.
pub struct MonitorSupervisor {
    poll_interval: Duration,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitorSupervisor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            threads: Mutex::new(Vec::new()),
        }
    }

    fn threads(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts watching `voice` for the sound `sound_id`.
    ///
    /// The monitor only holds the session flag, the voice handle and the
    /// backend. It stops when the flag is cleared or the handle is cancelled,
    /// and calls `on_finished` if the voice stopped (or the backend failed)
    /// while the flag was still set.
    pub fn spawn(
        &self,
        sound_id: &SoundId,
        session: Arc<AtomicBool>,
        voice: VoiceHandle,
        backend: Arc<dyn SpatialAudioBackend>,
        on_finished: FinishedHook,
    ) -> Result<MonitorHandle> {
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let poll_interval = self.poll_interval;
        let sound_id = sound_id.clone();

        let mut threads = self.threads();
        reap_finished(&mut threads);

        let thread = thread::Builder::new()
            .name(format!("orbitsonic-monitor-{}", sound_id))
            .spawn(move || {
                watch(
                    &sound_id,
                    poll_interval,
                    cancel_rx,
                    session,
                    voice,
                    backend.as_ref(),
                    on_finished,
                )
            })?;
        threads.push(thread);

        Ok(MonitorHandle {
            cancel: Some(cancel_tx),
        })
    }

    /// Number of monitors that have not exited yet.
    pub fn active_count(&self) -> usize {
        let mut threads = self.threads();
        reap_finished(&mut threads);
        threads.len()
    }

    /// Joins every monitor. A monitor calling this never joins itself.
    pub fn join_all(&self) {
        let threads = std::mem::take(&mut *self.threads());
        let current = thread::current().id();

        for handle in threads {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::error!("Completion monitor panicked");
            }
        }
    }
}

fn reap_finished(threads: &mut Vec<JoinHandle<()>>) {
    let (finished, running): (Vec<_>, Vec<_>) =
        threads.drain(..).partition(|handle| handle.is_finished());
    *threads = running;

    for handle in finished {
        if handle.join().is_err() {
            log::error!("Completion monitor panicked");
        }
    }
}

fn watch(
    sound_id: &SoundId,
    poll_interval: Duration,
    cancel: Receiver<()>,
    session: Arc<AtomicBool>,
    voice: VoiceHandle,
    backend: &dyn SpatialAudioBackend,
    on_finished: FinishedHook,
) {
    loop {
        match cancel.recv_timeout(poll_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::trace!("Monitor for {} cancelled", sound_id);
                return;
            }
        }

        if !session.load(Ordering::Acquire) {
            return;
        }

        match backend.voice_state(voice) {
            Ok(VoiceState::Playing | VoiceState::Paused | VoiceState::Initial) => {}
            Ok(VoiceState::Stopped) => break,
            Err(e) => {
                log::warn!("Polling {} of {} failed: {}", voice, sound_id, e);
                break;
            }
        }
    }

    if session.load(Ordering::Acquire) {
        log::debug!("Sound {} finished playing", sound_id);
        on_finished();
    }
}
