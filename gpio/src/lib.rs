pub mod delay;
pub mod gpiod;
pub mod lcd;
pub mod mock;
pub mod raw;
mod session;

use std::fmt::Debug;
use thiserror::Error;

pub use session::SessionGuard;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A way of getting exclusive access to a GPIO subsystem.
///
/// Acquiring returns a [GpioDriver] handle, which represents the held session. Dropping the handle
/// (and every output pin taken from it) releases the session.
pub trait GpioBackend: Debug + Send {
    /// Acquires the GPIO subsystem.
    ///
    /// # Errors
    /// - `GpioError::AlreadyInUse` if another session is already held.
    /// - `GpioError::Io` if the underlying device could not be opened (e.g. permission denied).
    fn acquire(&self) -> GpioResult<Box<dyn GpioDriver>>;
}

/// An acquired GPIO session.
pub trait GpioDriver: Debug + Send {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Binds the GPIO pin at the given index as an output.
    ///
    /// The returned pin is owned and keeps the session alive until dropped.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - `GpioError::AlreadyInUse` if the pin is already bound.
    fn output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput>>;
}

pub trait GpioOutput: Debug + Send {
    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;

    /// Drives the GPIO pin high.
    fn set_high(&self) -> GpioResult<()> {
        self.write(true)
    }

    /// Drives the GPIO pin low.
    fn set_low(&self) -> GpioResult<()> {
        self.write(false)
    }
}
