//! Decodes a mock event log back into what the controller would have latched.
use crate::lcd::hd44780::LcdPins;
use crate::mock::MockEvent;
use std::collections::HashMap;

/// One nibble as seen by the controller on a falling edge of E.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Latch {
    pub rs: bool,
    pub nibble: u8,
}

pub(crate) fn latches(events: &[MockEvent], pins: &LcdPins) -> Vec<Latch> {
    let mut levels: HashMap<usize, bool> = HashMap::new();
    let mut latched = Vec::new();
    for event in events {
        if let MockEvent::Write { pin, high } = *event {
            let was_high = levels.insert(pin, high).unwrap_or(false);
            if pin == pins.e && was_high && !high {
                let level = |pin: usize| levels.get(&pin).copied().unwrap_or(false);
                let nibble = [pins.d4, pins.d5, pins.d6, pins.d7]
                    .iter()
                    .enumerate()
                    .filter(|&(_, &pin)| level(pin))
                    .fold(0u8, |acc, (bit, _)| acc | 1 << bit);
                latched.push(Latch {
                    rs: level(pins.rs),
                    nibble,
                });
            }
        }
    }
    latched
}

/// Pairs up latched nibbles into `(rs, byte)`, high nibble first.
pub(crate) fn bytes(latched: &[Latch]) -> Vec<(bool, u8)> {
    assert_eq!(latched.len() % 2, 0, "odd number of nibbles on the bus");
    latched
        .chunks(2)
        .map(|pair| {
            assert_eq!(pair[0].rs, pair[1].rs, "RS changed in the middle of a byte");
            (pair[0].rs, pair[0].nibble << 4 | pair[1].nibble)
        })
        .collect()
}
