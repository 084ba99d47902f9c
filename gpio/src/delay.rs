//! Blocking delays for bus timing.
//!
//! Drivers take any [DelayNs], so tests can swap in a recording fake.
pub use embedded_hal::delay::DelayNs;

use std::thread::sleep;
use std::time::Duration;

/// [DelayNs] backed by [std::thread::sleep].
///
/// Sleeping never returns early, so every delay is a lower bound, as the HD44780 timing requires.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        sleep(Duration::from_nanos(ns.into()));
    }
}
