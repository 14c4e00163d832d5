//! Persistent best-roll state and the in-memory roll history.
//!
//! The on-disk format is a single run of ASCII digits, no trailing newline,
//! whole-file overwrite. The write goes through a temp file in the same
//! directory followed by a rename, so an interrupted write cannot truncate
//! the stored value.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// The best roll observed across runs, backed by a text file.
///
/// The best value is monotonically non-decreasing: `update` persists only
/// strict improvements and never lowers the stored value.
pub struct BestRollStore {
    path: PathBuf,
    best: u32,
}

impl BestRollStore {
    /// Load the persisted best roll. A missing file is the normal first-run
    /// condition and yields 0; unreadable or unparsable content also yields
    /// 0 so a damaged file never blocks startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let best = match fs::read_to_string(&path) {
            Ok(content) => match content.trim().parse::<u32>() {
                Ok(best) => {
                    info!("Loaded best roll {} from {}", best, path.display());
                    best
                }
                Err(_) => {
                    error!(
                        "Could not parse {:?} in {} as a roll; starting from 0",
                        content,
                        path.display()
                    );
                    0
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("No {} yet; starting from 0", path.display());
                0
            }
            Err(e) => {
                error!(
                    "Could not read {}: {}; starting from 0",
                    path.display(),
                    e
                );
                0
            }
        };
        Self { path, best }
    }

    pub fn best(&self) -> u32 {
        self.best
    }

    /// Record a new roll. Strict improvements are kept in memory and
    /// persisted immediately; anything else is a no-op returning false.
    ///
    /// On a persist failure the in-memory best is still advanced, so the
    /// loop keeps making correct store/skip decisions; the caller logs the
    /// error and continues.
    pub fn update(&mut self, roll: u32) -> Result<bool> {
        if roll <= self.best {
            return Ok(false);
        }
        self.best = roll;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, self.best.to_string())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        info!("Persisted new best roll {} to {}", roll, self.path.display());
        Ok(true)
    }
}

/// In-memory multiset of every roll observed this session, seeded from the
/// persisted best at startup. Never written to disk.
#[derive(Debug, Default)]
pub struct RollHistory {
    rolls: Vec<u32>,
}

impl RollHistory {
    /// Start a history seeded with the loaded best roll (when non-zero).
    pub fn seeded(best: u32) -> Self {
        let rolls = if best > 0 { vec![best] } else { Vec::new() };
        Self { rolls }
    }

    pub fn record(&mut self, roll: u32) {
        self.rolls.push(roll);
    }

    pub fn len(&self) -> usize {
        self.rolls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rolls.is_empty()
    }

    /// The most frequently observed roll. Ties go to whichever value
    /// reached the winning count first, in insertion order.
    pub fn most_frequent(&self) -> Option<u32> {
        let mut counts: HashMap<u32, u32> = HashMap::new();
        let mut best: Option<(u32, u32)> = None; // (roll, count)

        for &roll in &self.rolls {
            let count = counts.entry(roll).or_insert(0);
            *count += 1;
            match best {
                Some((_, best_count)) if *count > best_count => best = Some((roll, *count)),
                None => best = Some((roll, *count)),
                _ => {}
            }
        }
        best.map(|(roll, _)| roll)
    }
}
