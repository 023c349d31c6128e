//! Host notification for sounds that finish on their own.

use crate::sound_id::SoundId;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives the id of every sound that played to its end.
///
/// Called from completion monitor threads, possibly several at once, and never
/// for sounds that were stopped explicitly. Implementations must not call
/// [`OrbitSonicEngine::cleanup`](crate::OrbitSonicEngine::cleanup) from inside
/// the callback.
pub trait SoundFinishedCallback: Send + Sync {
    fn on_sound_finished(&self, sound_id: &SoundId);
}

impl<F> SoundFinishedCallback for F
where
    F: Fn(&SoundId) + Send + Sync,
{
    fn on_sound_finished(&self, sound_id: &SoundId) {
        self(sound_id)
    }
}

/// Holds at most one host callback.
#[derive(Default)]
pub struct CallbackSlot {
    current: Mutex<Option<Arc<dyn SoundFinishedCallback>>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> MutexGuard<'_, Option<Arc<dyn SoundFinishedCallback>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the callback, releasing the previous one.
    pub fn set(&self, callback: Arc<dyn SoundFinishedCallback>) {
        let previous = self.current().replace(callback);
        drop(previous);
    }

    pub fn release(&self) {
        let previous = self.current().take();
        drop(previous);
    }

    pub fn is_set(&self) -> bool {
        self.current().is_some()
    }

    /// Delivers `sound_id` to the current callback, if any.
    ///
    /// The callback is cloned out of the slot and invoked without the slot's
    /// lock held; the clone is dropped as soon as the call returns.
    pub fn notify(&self, sound_id: &SoundId) -> bool {
        let Some(callback) = self.current().clone() else {
            return false;
        };
        callback.on_sound_finished(sound_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn empty_slot_delivers_nothing() {
        let slot = CallbackSlot::new();
        assert!(!slot.notify(&SoundId::from("1_a.wav")));
    }

    #[test]
    fn closures_receive_the_sound_id() {
        let slot = CallbackSlot::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        slot.set(Arc::new(move |id: &SoundId| {
            sink.lock().unwrap().push(id.clone());
        }));

        assert!(slot.notify(&SoundId::from("7_rain.wav")));
        assert_eq!(*seen.lock().unwrap(), vec![SoundId::from("7_rain.wav")]);
    }

    #[test]
    fn replacing_and_releasing_drop_the_old_callback() {
        let slot = CallbackSlot::new();
        let first = Arc::new(|_: &SoundId| {});
        slot.set(first.clone());
        assert_eq!(Arc::strong_count(&first), 2);

        slot.set(Arc::new(|_: &SoundId| {}));
        assert_eq!(Arc::strong_count(&first), 1);

        slot.release();
        assert!(!slot.is_set());
    }

    #[test]
    fn callback_may_replace_itself_during_delivery() {
        let slot = Arc::new(CallbackSlot::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_slot = slot.clone();
        let inner_calls = calls.clone();
        slot.set(Arc::new(move |_: &SoundId| {
            inner_calls.fetch_add(1, Ordering::SeqCst);
            inner_slot.release();
        }));

        assert!(slot.notify(&SoundId::from("1_a.wav")));
        assert!(!slot.notify(&SoundId::from("1_a.wav")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
