use crate::delay::{DelayNs, StdDelay};
use crate::lcd::hd44780::driver::{GpioHD44780Driver, HD44780Driver};
use crate::lcd::hd44780::{LcdConfig, LcdError, LcdResult};
use crate::{GpioBackend, GpioDriver};
use log::{debug, info, trace, warn};
use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Line-oriented HD44780 display on a 4-bit GPIO bus.
///
/// The display starts closed. [Self::open] acquires the GPIO subsystem from the backend, binds the
/// six pins and initializes the controller; [Self::close] blanks it, turns it off and gives
/// everything back. While closed, every operation other than [Self::open] quietly does nothing.
///
/// Each row keeps a copy of what was last written to it, and rewriting the same text costs no bus
/// traffic at all.
///
/// All state sits behind one lock held for the whole of each call, so the display can be shared
/// between threads without transfers ever interleaving on the bus.
#[derive(Debug)]
pub struct HD44780Display<D = StdDelay> {
    state: Mutex<DisplayState<D>>,
}

#[derive(Debug)]
struct DisplayState<D> {
    backend: Box<dyn GpioBackend>,
    config: LcdConfig,
    delay: D,
    session: Option<Session<D>>,
}

/// Everything that only exists while the display is open.
#[derive(Debug)]
struct Session<D> {
    driver: GpioHD44780Driver<D>,
    last_lines: Vec<String>,
    // Declared last so the pins in `driver` are dropped before the session is released
    _gpio: Box<dyn GpioDriver>,
}

impl HD44780Display {
    /// Creates a closed display with the default configuration.
    pub fn new(backend: impl GpioBackend + 'static) -> Self {
        Self::with_config(backend, LcdConfig::default())
    }

    /// Creates a closed display with the given configuration.
    pub fn with_config(backend: impl GpioBackend + 'static, config: LcdConfig) -> Self {
        Self::with_delay(backend, config, StdDelay)
    }
}

impl<D: DelayNs + Clone + Debug> HD44780Display<D> {
    /// Creates a closed display that times the bus with `delay`.
    pub fn with_delay(backend: impl GpioBackend + 'static, config: LcdConfig, delay: D) -> Self {
        HD44780Display {
            state: Mutex::new(DisplayState {
                backend: Box::new(backend),
                config,
                delay,
                session: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState<D>> {
        // Every transfer leaves the state consistent, even one cut short by a panic
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets a copy of the current configuration.
    pub fn config(&self) -> LcdConfig {
        self.lock().config.clone()
    }

    /// Replaces the configuration. Only possible while the display is closed.
    pub fn set_config(&self, config: LcdConfig) -> LcdResult<()> {
        let mut state = self.lock();
        if state.session.is_some() {
            return Err(LcdError::InvalidArgument("cannot reconfigure an open display"));
        }
        config.validate()?;
        state.config = config;
        Ok(())
    }

    /// Gets whether the display is open.
    pub fn is_active(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Acquires the GPIO subsystem, binds the pins and initializes the controller.
    ///
    /// Does nothing if the display is already open.
    ///
    /// # Errors
    /// - `LcdError::InvalidArgument` if the configuration is invalid.
    /// - `LcdError::ResourceUnavailable` if the GPIO subsystem or one of the pins can't be had.
    ///   Nothing stays bound and the display stays closed.
    pub fn open(&self) -> LcdResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.session.is_some() {
            return Ok(());
        }

        state.config.validate()?;

        let gpio = state.backend.acquire().map_err(LcdError::ResourceUnavailable)?;
        let pins = state.config.pins;
        debug!("Binding LCD pins {:?} on {:?}", pins, gpio);

        let bind = |index: usize| gpio.output(index).map_err(LcdError::ResourceUnavailable);
        let mut driver = GpioHD44780Driver::new_4bit(
            bind(pins.rs)?,
            bind(pins.e)?,
            [bind(pins.d4)?, bind(pins.d5)?, bind(pins.d6)?, bind(pins.d7)?],
            state.delay.clone(),
        );

        driver.init()?;

        state.session = Some(Session {
            driver,
            last_lines: vec![String::new(); state.config.lines],
            _gpio: gpio,
        });

        info!("LCD opened ({}x{}).", state.config.width, state.config.lines);
        Ok(())
    }

    /// Runs the controller initialization again, e.g. after the display was power cycled.
    ///
    /// Keeps the GPIO session and pins. Does nothing while closed.
    pub fn reset(&self) -> LcdResult<()> {
        let mut state = self.lock();
        let Some(session) = state.session.as_mut() else {
            return Ok(());
        };

        debug!("Resetting LCD.");
        // Init clears the screen, so whatever the rows held is gone
        session.last_lines.fill(String::new());
        session.driver.init()?;
        Ok(())
    }

    /// Blanks every row, whatever it held.
    pub fn clear(&self) -> LcdResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return Ok(());
        };

        session.blank_rows(&state.config)
    }

    /// Blanks and switches off the display, drives every line low and releases the GPIO
    /// subsystem.
    ///
    /// Does nothing if the display is already closed. The pins and the session are given back
    /// even if a write on the way fails.
    pub fn close(&self) -> LcdResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(mut session) = state.session.take() else {
            return Ok(());
        };

        let result = session.power_down(&state.config);
        let released = session.driver.release().map_err(LcdError::from);
        drop(session);

        info!("LCD closed.");
        result.and(released)
    }

    /// Shows `text` on `row`, padded with spaces or cut to the display width.
    ///
    /// Skips the bus entirely if the row already shows the same text. Out of range rows and a
    /// closed display are ignored.
    ///
    /// Non-ASCII characters are shown as `?`. Characters `\u{0}` to `\u{7}` show the custom glyphs
    /// set with [Self::set_char].
    pub fn display(&self, row: usize, text: &str) -> LcdResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return Ok(());
        };

        session.show(&state.config, row, text)
    }

    /// Shows each line of `text` on the row of the same index, starting from the top.
    ///
    /// Lines past the last row are dropped. `\r\n` line endings are accepted.
    pub fn display_lines(&self, text: &str) -> LcdResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return Ok(());
        };

        for (row, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            session.show(&state.config, row, line)?;
        }
        Ok(())
    }

    /// Uploads a custom 5x8 glyph into slot `position` (0 to 7) of the character generator RAM.
    ///
    /// `glyph` holds one byte per pixel row, top first, using the low 5 bits.
    ///
    /// # Errors
    /// - `LcdError::InvalidArgument` if `glyph` isn't exactly 8 bytes or `position` is above 7.
    ///   Nothing is sent in that case.
    pub fn set_char(&self, position: u8, glyph: &[u8]) -> LcdResult<()> {
        if glyph.len() != 8 {
            return Err(LcdError::InvalidArgument("glyph must be exactly 8 bytes"));
        }
        if position > 7 {
            return Err(LcdError::InvalidArgument("glyph position must be between 0 and 7"));
        }

        let mut state = self.lock();
        let Some(session) = state.session.as_mut() else {
            return Ok(());
        };

        session.driver.set_cgram_address(position * 8)?;
        for &row in glyph {
            session.driver.send_data(row)?;
        }
        Ok(())
    }

    /// Does nothing: there's no backlight line in this wiring.
    pub fn toggle_backlight(&self) {
        trace!("No backlight control wired, ignoring toggle.");
    }
}

impl<D: DelayNs + Debug> Session<D> {
    fn show(&mut self, config: &LcdConfig, row: usize, text: &str) -> LcdResult<()> {
        if row >= config.lines {
            return Ok(());
        }

        let text = fit(text, config.width);
        if self.last_lines[row] == text {
            return Ok(());
        }

        // A row cut short shows neither the old text nor the new one
        self.last_lines[row].clear();
        self.write_row(config.line_addresses[row], &text)?;
        self.last_lines[row] = text;
        Ok(())
    }

    fn write_row(&mut self, address: u8, text: &str) -> LcdResult<()> {
        // The controller moves the address on by itself after each character
        self.driver.set_ddram_address(address & 0x7F)?;
        for c in text.chars() {
            self.driver.send_data(encode(c))?;
        }
        Ok(())
    }

    fn blank_rows(&mut self, config: &LcdConfig) -> LcdResult<()> {
        let blank = " ".repeat(config.width);
        for row in 0..config.lines {
            self.last_lines[row].clear();
            self.write_row(config.line_addresses[row], &blank)?;
            self.last_lines[row].clone_from(&blank);
        }
        Ok(())
    }

    fn power_down(&mut self, config: &LcdConfig) -> LcdResult<()> {
        self.blank_rows(config)?;
        self.driver.clear_display()?;
        self.driver.set_display_control(false, false, false)?;
        Ok(())
    }
}

/// Pads `text` with spaces or cuts it to exactly `width` characters.
fn fit(text: &str, width: usize) -> String {
    let mut fitted: String = text.chars().take(width).collect();
    let len = fitted.chars().count();
    fitted.extend(std::iter::repeat_n(' ', width - len));
    fitted
}

fn encode(c: char) -> u8 {
    if c.is_ascii() {
        c as u8
    } else {
        warn!("Non-ASCII character: {}", c);
        b'?'
    }
}
