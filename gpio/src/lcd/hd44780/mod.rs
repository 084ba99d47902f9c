//! HD44780 character LCD over a 4-bit GPIO bus.
//!
//! [driver] holds the command vocabulary and the nibble protocol, [HD44780Display] builds the
//! line-oriented display on top of it: session lifecycle, the init handshake, and per-row shadow
//! buffers so unchanged rows never reach the bus.
mod config;
mod display;
mod error;

pub mod driver;

pub use config::*;
pub use display::*;
pub use error::*;
