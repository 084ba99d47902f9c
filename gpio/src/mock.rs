//! In-memory GPIO backend that records everything done to it.
//!
//! Pin writes, delays and session acquire/release all land in one ordered event log, so tests
//! can check both what was put on the bus and the timing around it. Also handy for dry runs
//! without hardware.
use crate::delay::DelayNs;
use crate::{GpioBackend, GpioDriver, GpioError, GpioOutput, GpioResult};
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A single recorded interaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MockEvent {
    /// The session was acquired.
    Acquired,
    /// The session was released.
    Released,
    /// A pin was bound as an output.
    Bound { pin: usize },
    /// A pin was written.
    Write { pin: usize, high: bool },
    /// A delay was requested, in nanoseconds.
    Delay { ns: u32 },
}

#[derive(Debug, Default)]
struct MockState {
    events: Vec<MockEvent>,
    held: bool,
    unavailable: bool,
    bound: Vec<usize>,
    /// Writes still allowed to succeed, unlimited if `None`.
    writes_left: Option<usize>,
    failing_pins: Vec<usize>,
}

#[derive(Clone, Default)]
struct SharedState(Arc<Mutex<MockState>>);

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: MockEvent) {
        trace!("Mock: {:?}", event);
        self.lock().events.push(event);
    }
}

/// Recording backend. Clones share the same log and session state.
#[derive(Clone)]
pub struct MockGpioBackend {
    state: SharedState,
    pin_count: usize,
}

impl MockGpioBackend {
    /// Creates a backend exposing `pin_count` pins.
    pub fn new(pin_count: usize) -> Self {
        MockGpioBackend {
            state: SharedState::default(),
            pin_count,
        }
    }

    /// Makes further acquisitions fail with a permission error, as if the device was locked down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Lets the next `writes` pin writes through, then fails every write after them with a broken
    /// pipe, as if the device went away. Failed writes aren't logged.
    pub fn fail_writes_after(&self, writes: usize) {
        self.state.lock().writes_left = Some(writes);
    }

    /// Makes every write to `pin` fail with a broken pipe.
    pub fn fail_pin(&self, pin: usize) {
        self.state.lock().failing_pins.push(pin);
    }

    /// Lets every pin write through again.
    pub fn restore_writes(&self) {
        let mut state = self.state.lock();
        state.writes_left = None;
        state.failing_pins.clear();
    }

    /// Gets whether a session is currently held.
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Gets the pins currently bound as outputs.
    pub fn bound_pins(&self) -> Vec<usize> {
        self.state.lock().bound.clone()
    }

    /// Gets a copy of the event log.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// Takes the event log, leaving it empty.
    pub fn take_events(&self) -> Vec<MockEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Gets the amount of pin writes in the log.
    pub fn write_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, MockEvent::Write { .. }))
            .count()
    }

    /// Creates a delay that records into this backend's log instead of sleeping.
    pub fn delay(&self) -> MockDelay {
        MockDelay {
            state: self.state.clone(),
        }
    }
}

impl Default for MockGpioBackend {
    fn default() -> Self {
        MockGpioBackend::new(58)
    }
}

impl Debug for MockGpioBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioBackend({})", self.pin_count)
    }
}

impl GpioBackend for MockGpioBackend {
    fn acquire(&self) -> GpioResult<Box<dyn GpioDriver>> {
        {
            let mut state = self.state.lock();
            if state.unavailable {
                return Err(GpioError::Io(std::io::ErrorKind::PermissionDenied));
            }
            if state.held {
                return Err(GpioError::AlreadyInUse);
            }
            state.held = true;
        }
        self.state.record(MockEvent::Acquired);
        Ok(Box::new(MockGpioDriver {
            state: self.state.clone(),
            pin_count: self.pin_count,
        }))
    }
}

struct MockGpioDriver {
    state: SharedState,
    pin_count: usize,
}

impl Debug for MockGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver({})", self.pin_count)
    }
}

impl GpioDriver for MockGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.pin_count)
    }

    fn output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput>> {
        if index >= self.pin_count {
            return Err(GpioError::InvalidArgument);
        }
        {
            let mut state = self.state.lock();
            if state.bound.contains(&index) {
                return Err(GpioError::AlreadyInUse);
            }
            state.bound.push(index);
        }
        self.state.record(MockEvent::Bound { pin: index });
        Ok(Box::new(MockGpioOutput {
            state: self.state.clone(),
            pin_index: index,
        }))
    }
}

impl Drop for MockGpioDriver {
    fn drop(&mut self) {
        self.state.lock().held = false;
        self.state.record(MockEvent::Released);
    }
}

struct MockGpioOutput {
    state: SharedState,
    pin_index: usize,
}

impl Debug for MockGpioOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver[{}][output]", self.pin_index)
    }
}

impl GpioOutput for MockGpioOutput {
    fn write(&self, value: bool) -> GpioResult<()> {
        {
            let mut state = self.state.lock();
            if state.failing_pins.contains(&self.pin_index) || state.writes_left == Some(0) {
                return Err(GpioError::Io(std::io::ErrorKind::BrokenPipe));
            }
            if let Some(left) = state.writes_left.as_mut() {
                *left -= 1;
            }
        }
        self.state.record(MockEvent::Write {
            pin: self.pin_index,
            high: value,
        });
        Ok(())
    }
}

impl Drop for MockGpioOutput {
    fn drop(&mut self) {
        self.state.lock().bound.retain(|&pin| pin != self.pin_index);
    }
}

/// [DelayNs] that records the requested time into a [MockGpioBackend] log and returns at once.
#[derive(Clone)]
pub struct MockDelay {
    state: SharedState,
}

impl Debug for MockDelay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockDelay")
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.state.record(MockEvent::Delay { ns });
    }
}
