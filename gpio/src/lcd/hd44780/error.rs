use crate::GpioError;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum LcdError {
    /// The GPIO subsystem couldn't be acquired, or one of the pins couldn't be bound.
    #[error("GPIO resource unavailable: {0}")]
    ResourceUnavailable(#[source] GpioError),
    /// The caller passed something the controller can't take.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A pin write failed in the middle of a transfer.
    #[error("bus write failed: {0}")]
    Bus(#[from] GpioError),
}

pub type LcdResult<T> = Result<T, LcdError>;
