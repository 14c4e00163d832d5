//! Mouse input injection behind a seam the loop can be tested through.

use anyhow::{anyhow, Result};
use rdev::{simulate, Button, EventType};
use std::time::Duration;

/// Fire-and-forget click delivery at screen coordinates.
pub trait Clicker {
    fn click(&mut self, x: i32, y: i32, clicks: u32, interval: Duration) -> Result<()>;
}

/// Clicks through the OS input layer via `rdev`.
pub struct RdevClicker;

impl Clicker for RdevClicker {
    fn click(&mut self, x: i32, y: i32, clicks: u32, interval: Duration) -> Result<()> {
        send(&EventType::MouseMove {
            x: x as f64,
            y: y as f64,
        })?;
        // The OS needs a moment between injected events to deliver them.
        std::thread::sleep(Duration::from_millis(20));

        for i in 0..clicks {
            send(&EventType::ButtonPress(Button::Left))?;
            std::thread::sleep(Duration::from_millis(20));
            send(&EventType::ButtonRelease(Button::Left))?;
            if i + 1 < clicks {
                std::thread::sleep(interval);
            }
        }
        Ok(())
    }
}

fn send(event_type: &EventType) -> Result<()> {
    simulate(event_type).map_err(|e| anyhow!("Input injection failed for {:?}: {:?}", event_type, e))
}
