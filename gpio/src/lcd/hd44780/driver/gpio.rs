use crate::delay::DelayNs;
use crate::lcd::hd44780::driver::HD44780Driver;
use crate::{GpioOutput, GpioResult};
use log::trace;
use std::fmt::Debug;

/// HD44780 driver over a 4-bit GPIO bus, write-only (R/W tied to GND).
///
/// Every transfer sets RS, drives D4..D7 and strobes E with a fixed pulse width, then gives the
/// controller [Self::SETTLE_US] to execute. That's enough for every instruction except clear
/// display, which [HD44780Driver::clear_display] waits out on its own.
#[derive(Debug)]
pub struct GpioHD44780Driver<D> {
    pin_rs: Box<dyn GpioOutput>,
    pin_e: Box<dyn GpioOutput>,
    data_bus: [Box<dyn GpioOutput>; 4],
    delay: D,
}

impl<D: DelayNs + Debug> GpioHD44780Driver<D> {
    /// Width of each phase of the enable strobe (setup, high, hold).
    pub const ENABLE_PULSE_NS: u32 = 1_000;
    /// Wait after each transfer, above the 37 us most instructions take.
    pub const SETTLE_US: u32 = 50;

    /// Creates a new driver on the given pins.
    ///
    /// # Parameters
    ///
    /// - `pin_rs`: Register select output pin.
    /// - `pin_e`: Enable output pin.
    /// - `data_bus`: D4, D5, D6 and D7 output pins, in that order.
    /// - `delay`: Used for all bus timing.
    pub fn new_4bit(
        pin_rs: Box<dyn GpioOutput>,
        pin_e: Box<dyn GpioOutput>,
        data_bus: [Box<dyn GpioOutput>; 4],
        delay: D,
    ) -> Self {
        GpioHD44780Driver {
            pin_rs,
            pin_e,
            data_bus,
            delay,
        }
    }

    fn pulse_e(&mut self) -> GpioResult<()> {
        self.delay.delay_ns(Self::ENABLE_PULSE_NS);
        self.pin_e.set_high()?;
        self.delay.delay_ns(Self::ENABLE_PULSE_NS);
        // Latched on the falling edge
        self.pin_e.set_low()?;
        self.delay.delay_ns(Self::ENABLE_PULSE_NS);
        Ok(())
    }

    fn push4bits(&mut self, nibble: u8) -> GpioResult<()> {
        for (bit, pin) in self.data_bus.iter().enumerate() {
            pin.write(nibble & (1 << bit) != 0)?;
        }
        self.pulse_e()
    }

    fn write_nibble(&mut self, nibble: u8, rs: bool) -> GpioResult<()> {
        trace!("Sending nibble: {:04b}, RS: {}", nibble & 0x0F, rs);

        self.pin_rs.write(rs)?;
        self.push4bits(nibble & 0x0F)?;
        self.delay.delay_us(Self::SETTLE_US);
        Ok(())
    }

    fn send(&mut self, data: u8, rs: bool) -> GpioResult<()> {
        trace!("Sending data: {:08b}, RS: {}", data, rs);

        self.pin_rs.write(rs)?;
        self.push4bits(data >> 4)?;
        self.push4bits(data & 0x0F)?;
        self.delay.delay_us(Self::SETTLE_US);
        Ok(())
    }

    /// Drives every line low, leaving the bus idle.
    ///
    /// Tries every line even if one fails, and returns the first failure.
    pub fn release(&mut self) -> GpioResult<()> {
        let pins = [&self.pin_rs, &self.pin_e].into_iter().chain(&self.data_bus);
        pins.map(|pin| pin.set_low())
            .fold(Ok(()), |first, result| first.and(result))
    }
}

impl<D: DelayNs + Debug> HD44780Driver for GpioHD44780Driver<D> {
    fn init(&mut self) -> GpioResult<()> {
        // Three times 0x3 puts the controller in 8-bit mode whatever it was doing before,
        // including halfway through a 4-bit transfer
        self.send_nibble(0x3)?;
        self.wait_us(5_000);
        self.send_nibble(0x3)?;
        self.wait_us(240);
        self.send_nibble(0x3)?;
        self.wait_us(240);

        // Switch to 4-bit, from here on every byte goes as two nibbles
        self.send_nibble(0x2)?;
        self.wait_us(240);

        self.function_set(false, true, false)?;
        self.set_display_control(true, false, false)?;
        self.set_entry_mode(true, false)?;
        self.clear_display()
    }

    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.send(command, false)
    }

    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        self.send(data, true)
    }

    fn send_nibble(&mut self, nibble: u8) -> GpioResult<()> {
        self.write_nibble(nibble, false)
    }

    fn wait_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::LcdPins;
    use crate::lcd::hd44780::driver::testing::{Latch, bytes, latches};
    use crate::mock::{MockDelay, MockEvent, MockGpioBackend};
    use crate::{GpioBackend, GpioDriver};

    fn mock_driver(backend: &MockGpioBackend) -> (Box<dyn GpioDriver>, GpioHD44780Driver<MockDelay>) {
        let pins = LcdPins::default();
        let session = backend.acquire().unwrap();
        let driver = GpioHD44780Driver::new_4bit(
            session.output(pins.rs).unwrap(),
            session.output(pins.e).unwrap(),
            [
                session.output(pins.d4).unwrap(),
                session.output(pins.d5).unwrap(),
                session.output(pins.d6).unwrap(),
                session.output(pins.d7).unwrap(),
            ],
            backend.delay(),
        );
        backend.take_events();
        (session, driver)
    }

    #[test]
    fn nibble_maps_bit0_to_d4() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);
        let pins = LcdPins::default();

        driver.send_nibble(0b0001).unwrap();

        let events = backend.events();
        assert_eq!(
            &events[..5],
            &[
                MockEvent::Write { pin: pins.rs, high: false },
                MockEvent::Write { pin: pins.d4, high: true },
                MockEvent::Write { pin: pins.d5, high: false },
                MockEvent::Write { pin: pins.d6, high: false },
                MockEvent::Write { pin: pins.d7, high: false },
            ]
        );
    }

    #[test]
    fn enable_strobe_is_hold_raise_hold_lower_hold() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);
        let pins = LcdPins::default();

        driver.send_nibble(0x0).unwrap();

        let pulse = GpioHD44780Driver::<MockDelay>::ENABLE_PULSE_NS;
        let settle = GpioHD44780Driver::<MockDelay>::SETTLE_US * 1_000;
        let events = backend.events();
        assert_eq!(
            &events[5..],
            &[
                MockEvent::Delay { ns: pulse },
                MockEvent::Write { pin: pins.e, high: true },
                MockEvent::Delay { ns: pulse },
                MockEvent::Write { pin: pins.e, high: false },
                MockEvent::Delay { ns: pulse },
                MockEvent::Delay { ns: settle },
            ]
        );
    }

    #[test]
    fn bytes_go_high_nibble_first() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);

        driver.send_data(0xA5).unwrap();
        driver.send_command(0x3C).unwrap();

        let latched = latches(&backend.events(), &LcdPins::default());
        assert_eq!(
            latched,
            vec![
                Latch { rs: true, nibble: 0xA },
                Latch { rs: true, nibble: 0x5 },
                Latch { rs: false, nibble: 0x3 },
                Latch { rs: false, nibble: 0xC },
            ]
        );
    }

    #[test]
    fn init_sends_recovery_nibbles_then_setup_bytes() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);

        driver.init().unwrap();

        let latched = latches(&backend.events(), &LcdPins::default());
        assert!(latched.iter().all(|latch| !latch.rs));
        let nibbles: Vec<u8> = latched.iter().map(|latch| latch.nibble).collect();
        assert_eq!(&nibbles[..4], &[0x3, 0x3, 0x3, 0x2]);
        assert_eq!(
            bytes(&latched[4..]),
            vec![(false, 0x28), (false, 0x0C), (false, 0x06), (false, 0x01)]
        );
    }

    #[test]
    fn init_waits_out_every_step() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);
        let e = LcdPins::default().e;

        driver.init().unwrap();

        // Total delay between each latching edge and the next one
        let mut gaps = Vec::new();
        let mut current: Option<u64> = None;
        for event in backend.events() {
            match event {
                MockEvent::Write { pin, high: false } if pin == e => {
                    if let Some(gap) = current.replace(0) {
                        gaps.push(gap);
                    }
                }
                MockEvent::Delay { ns } => {
                    if let Some(gap) = current.as_mut() {
                        *gap += u64::from(ns);
                    }
                }
                _ => {}
            }
        }
        if let Some(gap) = current {
            gaps.push(gap);
        }

        // 4 recovery nibbles, then 4 bytes of 2 nibbles each
        assert_eq!(gaps.len(), 12);
        assert!(gaps[0] >= 5_000_000);
        assert!(gaps[1] >= 240_000);
        assert!(gaps[2] >= 240_000);
        assert!(gaps[3] >= 240_000);
        assert!(gaps[11] >= 5_000_000);
    }

    #[test]
    fn release_drives_all_lines_low() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);
        let pins = LcdPins::default();

        driver.release().unwrap();

        let mut lowered: Vec<usize> = backend
            .events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Write { pin, high: false } => Some(pin),
                _ => None,
            })
            .collect();
        lowered.sort();
        let mut expected = pins.all().to_vec();
        expected.sort();
        assert_eq!(lowered, expected);
        assert_eq!(backend.write_count(), 6);
    }

    #[test]
    fn cgram_address_is_range_checked() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);

        assert_eq!(driver.set_cgram_address(0x40), Err(crate::GpioError::InvalidArgument));
        assert_eq!(backend.write_count(), 0);

        driver.set_cgram_address(0x38).unwrap();
        assert_eq!(bytes(&latches(&backend.events(), &LcdPins::default())), vec![(false, 0x78)]);
    }

    #[test]
    fn ddram_address_is_range_checked() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);

        assert_eq!(driver.set_ddram_address(0x80), Err(crate::GpioError::InvalidArgument));
        assert_eq!(backend.write_count(), 0);

        driver.set_ddram_address(0x54).unwrap();
        assert_eq!(bytes(&latches(&backend.events(), &LcdPins::default())), vec![(false, 0xD4)]);
    }

    #[test]
    fn release_tries_every_line_after_a_failure() {
        let backend = MockGpioBackend::default();
        let (_session, mut driver) = mock_driver(&backend);
        let pins = LcdPins::default();

        backend.fail_pin(pins.rs);
        assert_eq!(
            driver.release(),
            Err(crate::GpioError::Io(std::io::ErrorKind::BrokenPipe))
        );

        let mut lowered: Vec<usize> = backend
            .events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Write { pin, high: false } => Some(pin),
                _ => None,
            })
            .collect();
        lowered.sort();
        let mut expected = vec![pins.e, pins.d4, pins.d5, pins.d6, pins.d7];
        expected.sort();
        assert_eq!(lowered, expected);
    }
}
