//! Cancellation hotkey: a global listener that sets one shared atomic flag
//! when Ctrl+Space is held. The loop reads the flag at the top of each
//! iteration; no other state crosses the thread boundary.

use rdev::{listen, EventType, Key};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

const CANCEL_COMBINATION: [Key; 2] = [Key::ControlLeft, Key::Space];

/// Tracks which keys of the cancel combination are currently held.
#[derive(Default)]
struct ComboTracker {
    held: HashSet<Key>,
}

impl ComboTracker {
    /// Returns true when this press completes the combination.
    fn on_press(&mut self, key: Key) -> bool {
        if !CANCEL_COMBINATION.contains(&key) {
            return false;
        }
        self.held.insert(key);
        CANCEL_COMBINATION.iter().all(|k| self.held.contains(k))
    }

    fn on_release(&mut self, key: Key) {
        self.held.remove(&key);
    }
}

/// Spawn the listener thread and return the flag it sets. The thread stays
/// blocked in the OS event hook for the life of the process; it holds
/// nothing but the flag, so letting the process exit tear it down is fine.
pub fn spawn_cancel_listener() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();

    thread::spawn(move || {
        let mut tracker = ComboTracker::default();
        let result = listen(move |event| match event.event_type {
            EventType::KeyPress(key) => {
                if tracker.on_press(key) {
                    info!("Ctrl+Space pressed; stopping after this iteration");
                    flag.store(true, Ordering::Relaxed);
                }
            }
            EventType::KeyRelease(key) => tracker.on_release(key),
            _ => {}
        });
        if let Err(e) = result {
            warn!(
                "Input listener unavailable ({:?}); the hotkey will not work",
                e
            );
        }
    });

    cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combination_requires_both_keys() {
        let mut tracker = ComboTracker::default();
        assert!(!tracker.on_press(Key::ControlLeft));
        assert!(tracker.on_press(Key::Space));
    }

    #[test]
    fn test_release_breaks_combination() {
        let mut tracker = ComboTracker::default();
        assert!(!tracker.on_press(Key::ControlLeft));
        tracker.on_release(Key::ControlLeft);
        assert!(!tracker.on_press(Key::Space));
    }

    #[test]
    fn test_unrelated_keys_ignored() {
        let mut tracker = ComboTracker::default();
        assert!(!tracker.on_press(Key::ControlLeft));
        assert!(!tracker.on_press(Key::KeyQ));
        // Releasing an unheld key (e.g. shift) must not disturb tracking.
        tracker.on_release(Key::ShiftLeft);
        assert!(tracker.on_press(Key::Space));
    }
}
