//! The decision loop: reroll, read, store improvements, stop on the target
//! roll or on cancellation.
//!
//! The loop is a single thread. The only concurrent collaborator is the
//! hotkey listener, which writes the cancellation flag; the flag is checked
//! exactly once per iteration, so an in-flight click or store always
//! completes before termination.

use anyhow::Result;
use image::RgbaImage;
use roll_store::{BestRollStore, RollHistory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::input::Clicker;
use crate::observer::RollObserver;

/// Fresh capture of the result region, once per iteration.
pub trait RoiSource {
    fn capture_roi(&mut self) -> Result<RgbaImage>;
}

/// Extracts a roll value from a captured ROI, or reports it absent.
pub trait ValueReader {
    fn read_roll(&self, roi: &RgbaImage) -> Option<u32>;
}

impl ValueReader for roll_vision::RollReader {
    fn read_roll(&self, roi: &RgbaImage) -> Option<u32> {
        roll_vision::RollReader::read_roll(self, roi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Iterating,
    Terminated,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A roll met the target; automation is no longer worth it.
    TargetReached(u32),
    /// The cancel hotkey was pressed.
    Cancelled,
}

/// Pacing and threshold knobs the loop needs, separated from the full
/// config so tests can zero the delays.
#[derive(Debug, Clone)]
pub struct LoopTuning {
    pub target_roll: u32,
    pub reroll_settle: Duration,
    pub post_store_delay: Duration,
    pub store_clicks: u32,
    pub store_click_interval: Duration,
}

pub struct RerollLoop<S, C, R> {
    roi_source: S,
    clicker: C,
    reader: R,
    store: BestRollStore,
    history: Option<RollHistory>,
    observer: Box<dyn RollObserver>,
    cancel: Arc<AtomicBool>,
    tuning: LoopTuning,
    reroll_at: (i32, i32),
    store_at: (i32, i32),
    state: LoopState,
    iterations: u64,
}

impl<S: RoiSource, C: Clicker, R: ValueReader> RerollLoop<S, C, R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        roi_source: S,
        clicker: C,
        reader: R,
        store: BestRollStore,
        history: Option<RollHistory>,
        observer: Box<dyn RollObserver>,
        cancel: Arc<AtomicBool>,
        tuning: LoopTuning,
        reroll_at: (i32, i32),
        store_at: (i32, i32),
    ) -> Self {
        Self {
            roi_source,
            clicker,
            reader,
            store,
            history,
            observer,
            cancel,
            tuning,
            reroll_at,
            store_at,
            state: LoopState::Init,
            iterations: 0,
        }
    }

    pub fn best(&self) -> u32 {
        self.store.best()
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Run until the target roll is reached or cancellation is requested.
    pub fn run(&mut self) -> Outcome {
        self.state = LoopState::Iterating;
        info!(
            "Reroll loop started (target {}, best so far {})",
            self.tuning.target_roll,
            self.store.best()
        );

        let outcome = loop {
            // 1. Cancellation, only at iteration boundaries.
            if self.cancel.load(Ordering::Relaxed) {
                break Outcome::Cancelled;
            }
            self.iterations += 1;

            // 2. Trigger a reroll.
            self.click(self.reroll_at, 1);

            // 3. Let the UI settle, then capture a fresh ROI.
            sleep(self.tuning.reroll_settle);
            let roi = match self.roi_source.capture_roi() {
                Ok(roi) => roi,
                Err(e) => {
                    warn!("Capture failed: {:#}; skipping this iteration", e);
                    continue;
                }
            };

            // 4. Read the roll; absent means retry next iteration.
            let roll = self.reader.read_roll(&roi);
            self.observer.on_extraction(&roi, roll);
            let Some(roll) = roll else {
                continue;
            };

            info!("Current roll: {}", roll);
            if let Some(history) = self.history.as_mut() {
                history.record(roll);
                if let Some(frequent) = history.most_frequent() {
                    info!(
                        "Most frequent roll: {} ({} observed)",
                        frequent,
                        history.len()
                    );
                }
            }

            // 5. Store strict improvements, then pause so the store click
            //    registers before the next reroll can cancel it.
            if roll > self.store.best() {
                self.click(self.store_at, self.tuning.store_clicks);
                if let Err(e) = self.store.update(roll) {
                    warn!("Failed to persist best roll {}: {:#}", roll, e);
                }
                sleep(self.tuning.post_store_delay);
            }
            info!("Best roll: {}", self.store.best());

            // 6. Good enough, stop automating.
            if roll >= self.tuning.target_roll {
                break Outcome::TargetReached(roll);
            }
        };

        self.state = LoopState::Terminated;
        match outcome {
            Outcome::TargetReached(roll) => {
                info!(
                    "Target reached with roll {} after {} iterations",
                    roll, self.iterations
                )
            }
            Outcome::Cancelled => {
                info!("Cancelled after {} iterations", self.iterations)
            }
        }
        outcome
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn click(&mut self, at: (i32, i32), clicks: u32) {
        debug!("Clicking at ({}, {}) x{}", at.0, at.1, clicks);
        if let Err(e) = self
            .clicker
            .click(at.0, at.1, clicks, self.tuning.store_click_interval)
        {
            // Injection is fire-and-forget; a failed click just means this
            // iteration accomplishes nothing.
            warn!("{:#}", e);
        }
    }
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use tempfile::TempDir;

    const REROLL_AT: (i32, i32) = (100, 200);
    const STORE_AT: (i32, i32) = (300, 400);

    struct BlankRois;

    impl RoiSource for BlankRois {
        fn capture_roi(&mut self) -> Result<RgbaImage> {
            Ok(RgbaImage::new(35, 20))
        }
    }

    /// Plays back a fixed sequence of reads, then raises the cancel flag so
    /// a misbehaving loop cannot spin forever.
    struct ScriptedReader {
        values: RefCell<VecDeque<Option<u32>>>,
        cancel: Arc<AtomicBool>,
    }

    impl ValueReader for ScriptedReader {
        fn read_roll(&self, _roi: &RgbaImage) -> Option<u32> {
            match self.values.borrow_mut().pop_front() {
                Some(value) => value,
                None => {
                    self.cancel.store(true, Ordering::Relaxed);
                    None
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingClicker {
        clicks: Rc<RefCell<Vec<((i32, i32), u32)>>>,
    }

    impl Clicker for RecordingClicker {
        fn click(&mut self, x: i32, y: i32, clicks: u32, _interval: Duration) -> Result<()> {
            self.clicks.borrow_mut().push(((x, y), clicks));
            Ok(())
        }
    }

    impl RecordingClicker {
        fn store_clicks(&self) -> Vec<u32> {
            self.clicks
                .borrow()
                .iter()
                .filter(|(at, _)| *at == STORE_AT)
                .map(|(_, n)| *n)
                .collect()
        }

        fn reroll_count(&self) -> usize {
            self.clicks
                .borrow()
                .iter()
                .filter(|(at, _)| *at == REROLL_AT)
                .count()
        }
    }

    fn zero_tuning(target: u32) -> LoopTuning {
        LoopTuning {
            target_roll: target,
            reroll_settle: Duration::ZERO,
            post_store_delay: Duration::ZERO,
            store_clicks: 2,
            store_click_interval: Duration::ZERO,
        }
    }

    fn make_loop(
        dir: &TempDir,
        values: Vec<Option<u32>>,
        target: u32,
        track_history: bool,
    ) -> (
        RerollLoop<BlankRois, RecordingClicker, ScriptedReader>,
        RecordingClicker,
        Arc<AtomicBool>,
    ) {
        let cancel = Arc::new(AtomicBool::new(false));
        let reader = ScriptedReader {
            values: RefCell::new(values.into()),
            cancel: cancel.clone(),
        };
        let clicker = RecordingClicker::default();
        let store = BestRollStore::load(dir.path().join("max_roll.txt"));
        let history = track_history.then(|| RollHistory::seeded(store.best()));
        let reroll_loop = RerollLoop::new(
            BlankRois,
            clicker.clone(),
            reader,
            store,
            history,
            Box::new(crate::observer::NullObserver),
            cancel.clone(),
            zero_tuning(target),
            REROLL_AT,
            STORE_AT,
        );
        (reroll_loop, clicker, cancel)
    }

    #[test]
    fn test_absent_roll_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (mut reroll_loop, clicker, _) =
            make_loop(&dir, vec![None, None, Some(100)], 100, false);

        let outcome = reroll_loop.run();
        assert_eq!(outcome, Outcome::TargetReached(100));
        // Two absent iterations rerolled but never touched the store button.
        assert_eq!(clicker.reroll_count(), 3);
        assert_eq!(clicker.store_clicks(), vec![2]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("max_roll.txt")).unwrap(),
            "100"
        );
    }

    #[test]
    fn test_threshold_terminates_even_without_improvement() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("max_roll.txt"), "150").unwrap();
        let (mut reroll_loop, clicker, _) = make_loop(&dir, vec![Some(100)], 100, false);

        let outcome = reroll_loop.run();
        assert_eq!(outcome, Outcome::TargetReached(100));
        // 100 did not beat the loaded 150: no store click, no write.
        assert!(clicker.store_clicks().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("max_roll.txt")).unwrap(),
            "150"
        );
    }

    #[test]
    fn test_improvements_store_and_persist_monotonically() {
        let dir = TempDir::new().unwrap();
        let (mut reroll_loop, clicker, _) = make_loop(
            &dir,
            vec![Some(10), Some(7), Some(12), Some(100)],
            100,
            false,
        );

        let outcome = reroll_loop.run();
        assert_eq!(outcome, Outcome::TargetReached(100));
        assert_eq!(reroll_loop.best(), 100);
        // Stored on 10, 12 and 100; 7 was not an improvement.
        assert_eq!(clicker.store_clicks(), vec![2, 2, 2]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("max_roll.txt")).unwrap(),
            "100"
        );
    }

    #[test]
    fn test_preset_cancel_stops_before_any_click() {
        let dir = TempDir::new().unwrap();
        let (mut reroll_loop, clicker, cancel) = make_loop(&dir, vec![Some(50)], 100, false);
        cancel.store(true, Ordering::Relaxed);

        let outcome = reroll_loop.run();
        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(reroll_loop.state(), LoopState::Terminated);
        assert!(clicker.clicks.borrow().is_empty());
        assert_eq!(reroll_loop.iterations(), 0);
    }

    #[test]
    fn test_cancel_takes_effect_at_iteration_boundary() {
        let dir = TempDir::new().unwrap();
        // Script runs dry after two reads; the reader then raises cancel.
        let (mut reroll_loop, clicker, _) =
            make_loop(&dir, vec![Some(30), Some(20)], 100, false);

        let outcome = reroll_loop.run();
        assert_eq!(outcome, Outcome::Cancelled);
        // Both scripted iterations completed (plus the dry read) before the
        // flag was honored.
        assert_eq!(clicker.reroll_count(), 3);
        assert_eq!(reroll_loop.best(), 30);
    }

    #[test]
    fn test_history_tracks_every_read_roll() {
        let dir = TempDir::new().unwrap();
        let (mut reroll_loop, _, _) =
            make_loop(&dir, vec![Some(5), Some(10), Some(5), Some(100)], 100, true);

        reroll_loop.run();
        let history = reroll_loop.history.as_ref().unwrap();
        assert_eq!(history.len(), 4);
    }
}
