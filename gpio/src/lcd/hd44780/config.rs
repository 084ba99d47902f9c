use crate::lcd::hd44780::{LcdError, LcdResult};
use serde::{Deserialize, Serialize};

/// GPIO line numbers for each signal of the LCD.
///
/// Defaults follow the usual Raspberry Pi wiring (BCM numbering): RS on 7, E on 8, D4..D7 on
/// 25, 24, 23 and 18.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct LcdPins {
    pub rs: usize,
    pub e: usize,
    pub d4: usize,
    pub d5: usize,
    pub d6: usize,
    pub d7: usize,
}

impl LcdPins {
    /// Gets all pins, in RS, E, D4, D5, D6, D7 order.
    pub fn all(&self) -> [usize; 6] {
        [self.rs, self.e, self.d4, self.d5, self.d6, self.d7]
    }
}

impl Default for LcdPins {
    fn default() -> Self {
        LcdPins {
            rs: 7,
            e: 8,
            d4: 25,
            d5: 24,
            d6: 23,
            d7: 18,
        }
    }
}

/// Wiring and geometry of a display.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct LcdConfig {
    pub pins: LcdPins,
    /// Amount of rows.
    pub lines: usize,
    /// Characters per row.
    pub width: usize,
    /// "Set DDRAM address" command for the first character of each row, indexed by row.
    pub line_addresses: Vec<u8>,
}

impl LcdConfig {
    /// The most rows a single controller can address.
    pub const MAX_LINES: usize = 4;
    /// The most characters a row can hold in 2-line mode.
    pub const MAX_WIDTH: usize = 40;

    /// Checks that the configuration describes something the controller can drive.
    pub fn validate(&self) -> LcdResult<()> {
        if self.lines == 0 || self.lines > Self::MAX_LINES {
            return Err(LcdError::InvalidArgument("lines must be between 1 and 4"));
        }
        if self.width == 0 || self.width > Self::MAX_WIDTH {
            return Err(LcdError::InvalidArgument("width must be between 1 and 40"));
        }
        if self.line_addresses.len() < self.lines {
            return Err(LcdError::InvalidArgument("missing line address for a row"));
        }
        if self.line_addresses[..self.lines].iter().any(|address| address & 0x80 == 0) {
            return Err(LcdError::InvalidArgument("line address must be a DDRAM command"));
        }
        let pins = self.pins.all();
        for (i, pin) in pins.iter().enumerate() {
            if pins[i + 1..].contains(pin) {
                return Err(LcdError::InvalidArgument("pin assigned to more than one signal"));
            }
        }
        Ok(())
    }
}

impl Default for LcdConfig {
    /// A 20x4 module.
    fn default() -> Self {
        LcdConfig {
            pins: LcdPins::default(),
            lines: 4,
            width: 20,
            line_addresses: vec![0x80, 0xC0, 0x94, 0xD4],
        }
    }
}
