//! Vision for the reroll automation: locating the two on-screen buttons by
//! template matching, and reading the roll value out of the result region.

mod locator;
mod roll_reader;

pub use locator::{locate, ButtonTemplate, MatchPoint};
pub use roll_reader::{binarize_roi, parse_roll, RollReader};
