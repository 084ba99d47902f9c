//! GPIO backend over the Linux GPIO character device, using the gpiod library.
//!
//! Works on boards where the register layout isn't known (e.g. RP1 on the Raspberry Pi 5), at the
//! cost of a syscall per pin write.
use crate::{GpioBackend, GpioDriver, GpioError, GpioOutput, GpioResult, SessionGuard};
use bitvec::vec::BitVec;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;

/// Backend that opens a `/dev/gpiochipN` device on acquisition.
#[derive(Debug, Clone)]
pub struct GpiodBackend {
    path: PathBuf,
}

impl GpiodBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        GpiodBackend { path: path.into() }
    }
}

impl Default for GpiodBackend {
    fn default() -> Self {
        GpiodBackend::new("/dev/gpiochip0")
    }
}

impl GpioBackend for GpiodBackend {
    fn acquire(&self) -> GpioResult<Box<dyn GpioDriver>> {
        let session = SessionGuard::acquire()?;
        let chip = gpiod::Chip::new(&self.path)?;
        let driver = GpiodDriver::new(chip, session);
        debug!("{:?} acquired.", driver);
        Ok(Box::new(driver))
    }
}

struct GpiodChip {
    chip: gpiod::Chip,
    used_pins: BitVec<AtomicU8>,
    _session: SessionGuard,
}

/// An acquired GPIO character device session.
pub struct GpiodDriver {
    shared: Arc<GpiodChip>,
}

impl GpiodDriver {
    fn new(chip: gpiod::Chip, session: SessionGuard) -> Self {
        let n = chip.num_lines() as usize;
        let bits = BitVec::repeat(false, n);
        Self {
            shared: Arc::new(GpiodChip {
                chip,
                used_pins: bits,
                _session: session,
            }),
        }
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.shared.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.shared.chip.num_lines() as usize)
    }

    fn output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.shared.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        let line = self.shared.chip.request_lines(
            gpiod::Options::output([index as u32]).consumer(env!("CARGO_PKG_NAME")),
        )?;

        self.shared.used_pins.set_aliased(index, true);

        Ok(Box::new(GpiodOutput {
            shared: Arc::clone(&self.shared),
            pin_index: index,
            line,
        }))
    }
}

struct GpiodOutput {
    shared: Arc<GpiodChip>,
    pin_index: usize,
    line: gpiod::Lines<gpiod::Output>,
}

impl Debug for GpiodOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})[{}][output]", self.shared.chip.name(), self.pin_index)
    }
}

impl GpioOutput for GpiodOutput {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.line.set_values([value])?;
        Ok(())
    }
}

impl Drop for GpiodOutput {
    fn drop(&mut self) {
        // The line request itself is released when `line` drops
        self.shared.used_pins.set_aliased(self.pin_index, false);
    }
}
