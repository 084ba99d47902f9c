//! Character LCD support.
pub mod hd44780;
