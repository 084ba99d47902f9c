use crate::{GpioBackend, GpioDriver, GpioError, GpioOutput, GpioResult, SessionGuard};
use bitvec::vec::BitVec;
use log::debug;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU8;

/// Backend that memory-maps the BCM283x/BCM2711 GPIO registers.
#[derive(Debug, Clone)]
pub struct RawGpioBackend {
    path: PathBuf,
    offset: u64,
}

impl RawGpioBackend {
    /// Default peripheral base, used when the device tree doesn't tell otherwise (BCM2836/7).
    const DEFAULT_PERIPHERAL_BASE: u64 = 0x3F000000;
    /// Offset of the GPIO register block from the peripheral base.
    const GPIO_OFFSET: u64 = 0x200000;

    /// Uses `/dev/gpiomem`, which exposes only the GPIO block and doesn't require root.
    pub fn new_gpiomem() -> Self {
        RawGpioBackend {
            path: PathBuf::from("/dev/gpiomem"),
            offset: 0,
        }
    }

    /// Uses `/dev/mem`, at the GPIO block of the detected peripheral base. Requires root.
    pub fn new_mem() -> Self {
        let base = std::fs::read("/proc/device-tree/soc/ranges")
            .ok()
            .and_then(|ranges| peripheral_base(&ranges))
            .unwrap_or(Self::DEFAULT_PERIPHERAL_BASE);
        debug!("Peripheral base: {:#x}", base);
        RawGpioBackend {
            path: PathBuf::from("/dev/mem"),
            offset: base + Self::GPIO_OFFSET,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GpioBackend for RawGpioBackend {
    fn acquire(&self) -> GpioResult<Box<dyn GpioDriver>> {
        let session = SessionGuard::acquire()?;
        let driver = RawGpioDriver::create(&self.path, self.offset, session)?;
        debug!("{:?} acquired.", driver);
        Ok(Box::new(driver))
    }
}

/// Reads the peripheral base out of a device tree `soc/ranges` property.
///
/// The parent address is the second cell; on BCM2711 it is 64-bit and the low word sits in the
/// third cell instead.
fn peripheral_base(ranges: &[u8]) -> Option<u64> {
    let cell = |i: usize| -> Option<u32> {
        let bytes = ranges.get(i * 4..i * 4 + 4)?;
        Some(u32::from_be_bytes(bytes.try_into().ok()?))
    };
    match cell(1)? {
        0 => cell(2).filter(|&base| base != 0).map(u64::from),
        base => Some(base.into()),
    }
}

struct RawGpioRegisters {
    mmap: MmapRaw,
    used_pins: BitVec<AtomicU8>,
    _session: SessionGuard,
}

impl RawGpioRegisters {
    fn raw_set_pin_function(&self, pin_index: usize, function: u8) -> GpioResult<()> {
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }

        if pin_index >= RawGpioDriver::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift);
        register_value |= (function as u32) << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        if pin_index >= RawGpioDriver::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPSETn/GPCLRn register
        let register_ptr = unsafe { mmap.add(if high { 0x1c / 4 } else { 0x28 / 4 } + pin_index / 32) };
        let shift = pin_index % 32;

        unsafe { register_ptr.write_volatile(1 << shift) };

        Ok(())
    }
}

/// An acquired memory-mapped GPIO session.
pub struct RawGpioDriver {
    registers: Arc<RawGpioRegisters>,
}

impl RawGpioDriver {
    const PIN_COUNT: usize = 58;

    fn create(path: &Path, offset: u64, session: SessionGuard) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(4096)
            .map_raw(&file)?;

        Ok(RawGpioDriver {
            registers: Arc::new(RawGpioRegisters {
                mmap,
                used_pins: BitVec::repeat(false, Self::PIN_COUNT),
                _session: session,
            }),
        })
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.registers.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.registers.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        // Start low so the line doesn't glitch high when switched to output
        self.registers.raw_set_pin_output(index, false)?;
        self.registers.raw_set_pin_function(index, 1)?;
        self.registers.used_pins.set_aliased(index, true);

        Ok(Box::new(RawGpioOutput {
            registers: Arc::clone(&self.registers),
            pin_index: index,
        }))
    }
}

struct RawGpioOutput {
    registers: Arc<RawGpioRegisters>,
    pin_index: usize,
}

impl Debug for RawGpioOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RawGpioDriver({:?})[{}][output]",
            self.registers.mmap.as_ptr().addr(),
            self.pin_index
        )
    }
}

impl GpioOutput for RawGpioOutput {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.registers.raw_set_pin_output(self.pin_index, value)
    }
}

impl Drop for RawGpioOutput {
    fn drop(&mut self) {
        _ = self.registers.raw_set_pin_function(self.pin_index, 0); // Set to input
        self.registers.used_pins.set_aliased(self.pin_index, false);
    }
}
