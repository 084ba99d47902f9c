use crate::{GpioError, GpioResult};
use log::debug;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set while any hardware backend holds the GPIO subsystem in this process.
static SESSION_HELD: AtomicBool = AtomicBool::new(false);

/// Process-wide claim on the GPIO subsystem.
///
/// Hardware backends take one when acquired and keep it inside the session handle, so only one
/// session can be live at a time. The claim is given back when the guard is dropped.
pub struct SessionGuard {
    _private: (),
}

impl SessionGuard {
    /// Claims the GPIO subsystem for this process.
    ///
    /// # Errors
    /// - `GpioError::AlreadyInUse` if another guard is alive.
    pub fn acquire() -> GpioResult<Self> {
        if SESSION_HELD
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GpioError::AlreadyInUse);
        }
        debug!("GPIO session acquired");
        Ok(SessionGuard { _private: () })
    }

    /// Gets whether any guard is currently alive.
    pub fn is_held() -> bool {
        SESSION_HELD.load(Ordering::Acquire)
    }
}

impl Debug for SessionGuard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionGuard")
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        SESSION_HELD.store(false, Ordering::Release);
        debug!("GPIO session released");
    }
}
