mod gpio;
#[cfg(test)]
pub(crate) mod testing;

use crate::{GpioError, GpioResult};
pub use gpio::*;
use std::fmt::Debug;

/// Time the controller needs to execute a clear display command.
pub const CLEAR_DISPLAY_US: u32 = 5_000;

/// Write-only command set of the HD44780 controller.
///
/// The high-level commands build their instruction byte and hand it to [Self::send_command], so an
/// implementation only has to provide the bus primitives at the bottom.
pub trait HD44780Driver: Debug {
    /// Brings the controller up into 4-bit, 2-line mode from any prior state.
    ///
    /// Leaves the display on with cursor and blink off, cursor moving right, and DDRAM cleared.
    fn init(&mut self) -> GpioResult<()>;

    /// Clears the display and sets the cursor to the home position.
    ///
    /// Waits out the execution time of the command before returning.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(0b00000001)?;
        self.wait_us(CLEAR_DISPLAY_US);
        Ok(())
    }

    /// Sets which way the address counter moves after each data byte, and whether the whole
    /// display shifts along with it.
    fn set_entry_mode(&mut self, increment: bool, shift: bool) -> GpioResult<()> {
        self.send_command(0x04 | flag(increment, 0x02) | flag(shift, 0x01))
    }

    /// Switches the display, the underline cursor and the blinking block on or off.
    fn set_display_control(&mut self, display: bool, cursor: bool, blink: bool) -> GpioResult<()> {
        self.send_command(0x08 | flag(display, 0x04) | flag(cursor, 0x02) | flag(blink, 0x01))
    }

    /// Sets bus width (8 bits if `eight_bit`), line mode and font (5x10 if `large_font`).
    fn function_set(
        &mut self,
        eight_bit: bool,
        two_lines: bool,
        large_font: bool,
    ) -> GpioResult<()> {
        let command = 0x20 | flag(eight_bit, 0x10) | flag(two_lines, 0x08);
        self.send_command(command | flag(large_font, 0x04))
    }

    /// Points the address counter at `address` in the character generator RAM.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if `address` doesn't fit in 6 bits. Nothing is sent.
    fn set_cgram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0x3F {
            return Err(GpioError::InvalidArgument);
        }
        self.send_command(0x40 | address)
    }

    /// Points the address counter at `address` in the display data RAM.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if `address` doesn't fit in 7 bits. Nothing is sent.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0x7F {
            return Err(GpioError::InvalidArgument);
        }
        self.send_command(0x80 | address)
    }

    // Bus primitives

    /// Sends an instruction byte, with RS low.
    fn send_command(&mut self, command: u8) -> GpioResult<()>;

    /// Sends a byte to whichever RAM the address counter points at, with RS high.
    fn send_data(&mut self, data: u8) -> GpioResult<()>;

    /// Sends the low 4 bits of `nibble` as a single command transfer.
    ///
    /// Only meaningful before 4-bit framing is established, i.e. during [Self::init].
    fn send_nibble(&mut self, nibble: u8) -> GpioResult<()>;

    /// Blocks for at least `us` microseconds.
    fn wait_us(&mut self, us: u32);
}

fn flag(set: bool, bit: u8) -> u8 {
    if set { bit } else { 0 }
}
