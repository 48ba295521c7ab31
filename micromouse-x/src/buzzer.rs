//! Notes and melodies for the piezo buzzer.

/// Note frequencies [Hz], equal temperament rounded down.
pub mod pitch {
    pub const C4: u32 = 261;
    pub const CS4: u32 = 277;
    pub const D4: u32 = 293;
    pub const DS4: u32 = 311;
    pub const E4: u32 = 329;
    pub const F4: u32 = 349;
    pub const FS4: u32 = 369;
    pub const G4: u32 = 391;
    pub const GS4: u32 = 415;
    pub const A4: u32 = 440;
    pub const AS4: u32 = 466;
    pub const B4: u32 = 493;
    pub const C5: u32 = 523;
    pub const CS5: u32 = 554;
    pub const D5: u32 = 587;
    pub const DS5: u32 = 622;
    pub const E5: u32 = 659;
    pub const F5: u32 = 698;
    pub const FS5: u32 = 739;
    pub const G5: u32 = 783;
    pub const GS5: u32 = 830;
    pub const A5: u32 = 880;
    pub const AS5: u32 = 932;
    pub const B5: u32 = 987;
    pub const C6: u32 = 1046;
    pub const CS6: u32 = 1108;
    pub const D6: u32 = 1174;
    pub const DS6: u32 = 1244;
    pub const E6: u32 = 1318;
    pub const F6: u32 = 1396;
    pub const FS6: u32 = 1479;
    pub const G6: u32 = 1567;
    pub const GS6: u32 = 1661;
    pub const A6: u32 = 1760;
    pub const AS6: u32 = 1864;
    pub const B6: u32 = 1975;
    pub const C7: u32 = 2093;
    pub const CS7: u32 = 2217;
    pub const D7: u32 = 2349;
    pub const DS7: u32 = 2489;
    pub const E7: u32 = 2637;
    pub const F7: u32 = 2793;
    pub const FS7: u32 = 2959;
    pub const G7: u32 = 3135;
    pub const GS7: u32 = 3322;
    pub const A7: u32 = 3520;
    pub const AS7: u32 = 3729;
    pub const B7: u32 = 3951;
    pub const C8: u32 = 4186;
}

use pitch::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Note {
    /// [Hz], 0 for a rest
    pub frequency: u32,
    /// [ms]
    pub duration_ms: u32,
}

impl Note {
    pub const fn new(frequency: u32, duration_ms: u32) -> Self {
        Self {
            frequency,
            duration_ms,
        }
    }

    pub const fn rest(duration_ms: u32) -> Self {
        Self::new(0, duration_ms)
    }

    /// Whole periods that fit in the note.
    pub fn cycles(&self) -> u32 {
        self.duration_ms * self.frequency / 1000
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Melody {
    Startup,
    Accept,
    Goal,
    Error,
}

impl Melody {
    pub fn notes(self) -> &'static [Note] {
        const STARTUP: &[Note] = &[
            Note::new(C6, 80),
            Note::new(E6, 80),
            Note::new(G6, 80),
            Note::new(C7, 160),
        ];
        const ACCEPT: &[Note] = &[Note::new(A6, 60), Note::new(A7, 60)];
        const GOAL: &[Note] = &[
            Note::new(G5, 120),
            Note::new(C6, 120),
            Note::new(E6, 120),
            Note::new(G6, 240),
            Note::rest(60),
            Note::new(E6, 120),
            Note::new(G6, 360),
        ];
        const ERROR: &[Note] = &[
            Note::new(C5, 200),
            Note::rest(50),
            Note::new(C5, 200),
            Note::rest(50),
            Note::new(C4, 400),
        ];
        match self {
            Melody::Startup => STARTUP,
            Melody::Accept => ACCEPT,
            Melody::Goal => GOAL,
            Melody::Error => ERROR,
        }
    }

    /// Total play time [ms]
    pub fn duration_ms(self) -> u32 {
        self.notes().iter().map(|note| note.duration_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_concert_pitch() {
        assert_eq!(A4, 440);
        assert_eq!(A5, 2 * A4);
        assert!(C4 < CS4 && B7 < C8);
    }

    #[test]
    fn cycles_count_whole_periods() {
        assert_eq!(Note::new(A4, 500).cycles(), 220);
        assert_eq!(Note::rest(100).cycles(), 0);
    }

    #[test]
    fn melodies_are_not_empty() {
        for melody in [Melody::Startup, Melody::Accept, Melody::Goal, Melody::Error] {
            assert!(!melody.notes().is_empty());
        }
        assert_eq!(Melody::Accept.duration_ms(), 120);
    }
}
