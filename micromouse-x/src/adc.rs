/// Full-scale input with the internal 0.6 V reference and 1/6 gain [mV]
pub const FULL_SCALE_MV: i32 = 3600;
pub const RESOLUTION_BITS: u32 = 12;

/// Converts a single-ended SAADC result to millivolts. Readings below ground clamp to zero.
pub fn raw_to_millivolts(raw: i16) -> i32 {
    (i32::from(raw).max(0) * FULL_SCALE_MV) >> RESOLUTION_BITS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_full_range() {
        assert_eq!(raw_to_millivolts(0), 0);
        assert_eq!(raw_to_millivolts(2048), 1800);
        assert_eq!(raw_to_millivolts(4096), 3600);
    }

    #[test]
    fn clamps_negative_readings() {
        assert_eq!(raw_to_millivolts(-12), 0);
    }
}
