//! WS2812 RGB LED frame buffer and its encoding into PWM sequence words.
//!
//! The PWM runs at 16 MHz with a 20 tick period (1.25 us per bit). Each word holds the compare
//! value for one bit; bit 15 selects the inverted polarity so the line idles low.

use crate::datatypes::MouseState;

/// PWM ticks per encoded bit
pub const BIT_PERIOD_TICKS: u16 = 20;
pub const T0H: u16 = 0x8000 | 7;
pub const T1H: u16 = 0x8000 | 13;
/// Low level word used for the latch period
pub const RESET_WORD: u16 = 0x8000;
/// Latch of at least 50 us
pub const RESET_WORDS: usize = 40;

const BITS_PER_LED: usize = 24;

/// Sequence words needed for `count` LEDs including the latch.
pub const fn sequence_len(count: usize) -> usize {
    count * BITS_PER_LED + RESET_WORDS
}

pub struct Indicator<const N: usize> {
    /// Green, red, blue per LED, the order the WS2812 shifts them in
    buffer: [[u8; 3]; N],
}

impl<const N: usize> Indicator<N> {
    pub const fn new() -> Self {
        Self {
            buffer: [[0; 3]; N],
        }
    }

    pub const fn counts(&self) -> usize {
        N
    }

    /// Positions past the last LED are ignored.
    pub fn set(&mut self, pos: usize, r: u8, g: u8, b: u8) {
        if let Some(led) = self.buffer.get_mut(pos) {
            *led = [g, r, b];
        }
    }

    /// Sets a colour given as `0xRRGGBB`.
    pub fn set_rgb(&mut self, pos: usize, rgb: u32) {
        self.set(pos, (rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8);
    }

    pub fn set_all(&mut self, rgb: u32) {
        for pos in 0..N {
            self.set_rgb(pos, rgb);
        }
    }

    pub fn clear(&mut self) {
        self.buffer = [[0; 3]; N];
    }

    /// Fills `words` with the sequence for the current colours, MSB first, and returns the
    /// number of words written. `None` if `words` is shorter than [`sequence_len`].
    pub fn encode(&self, words: &mut [u16]) -> Option<usize> {
        let len = sequence_len(N);
        let words = words.get_mut(..len)?;
        let (bits, reset) = words.split_at_mut(N * BITS_PER_LED);

        let bytes = self.buffer.iter().flatten();
        for (byte, chunk) in bytes.zip(bits.chunks_exact_mut(8)) {
            for (i, word) in chunk.iter_mut().enumerate() {
                *word = if byte & (0x80 >> i) != 0 { T1H } else { T0H };
            }
        }
        reset.fill(RESET_WORD);
        Some(len)
    }
}

impl<const N: usize> Default for Indicator<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Colour shown for a mouse state and whether it blinks.
pub fn state_pattern(state: MouseState) -> (u32, bool) {
    match state {
        MouseState::Idle => (0x00_20_00, true),
        MouseState::Calibrating => (0x20_20_00, true),
        MouseState::Searching => (0x00_00_40, false),
        MouseState::Returning => (0x00_20_20, false),
        MouseState::FastRun => (0x40_00_40, false),
        MouseState::Error => (0x40_00_00, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_stores_grb() {
        let mut indicator = Indicator::<2>::new();
        indicator.set_rgb(1, 0x112233);
        indicator.set(5, 1, 2, 3);
        assert_eq!(indicator.buffer, [[0, 0, 0], [0x22, 0x11, 0x33]]);
        indicator.clear();
        assert_eq!(indicator.buffer, [[0; 3]; 2]);
    }

    #[test]
    fn encode_msb_first_with_latch() {
        let mut indicator = Indicator::<1>::new();
        // Green 0x80, red 0x01
        indicator.set(0, 0x01, 0x80, 0x00);
        let mut words = [0u16; sequence_len(1)];
        assert_eq!(indicator.encode(&mut words), Some(sequence_len(1)));

        assert_eq!(words[0], T1H);
        assert!(words[1..8].iter().all(|word| *word == T0H));
        assert!(words[8..15].iter().all(|word| *word == T0H));
        assert_eq!(words[15], T1H);
        assert!(words[16..24].iter().all(|word| *word == T0H));
        assert!(words[24..].iter().all(|word| *word == RESET_WORD));
    }

    #[test]
    fn encode_rejects_short_buffer() {
        let indicator = Indicator::<4>::new();
        let mut words = [0u16; 24];
        assert_eq!(indicator.encode(&mut words), None);
    }

    #[test]
    fn high_times_fit_the_bit_period() {
        assert!(T0H & 0x7FFF < T1H & 0x7FFF);
        assert!(T1H & 0x7FFF < BIT_PERIOD_TICKS);
    }
}
