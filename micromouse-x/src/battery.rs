use crate::average::MovingAverage;
use crate::parameters::BATTERY_AVERAGE_COUNT;

/// Trim added after undoing the divider [mV]
const DIVIDER_OFFSET_MV: i32 = 100;

/// Battery voltage tracking from the divider tap.
pub struct Battery {
    average: MovingAverage<BATTERY_AVERAGE_COUNT>,
    voltage: i32,
}

impl Battery {
    pub const fn new() -> Self {
        Self {
            average: MovingAverage::new(),
            voltage: 0,
        }
    }

    /// Takes the divider tap voltage and returns the averaged battery voltage [mV].
    pub fn update(&mut self, tap_millivolts: i32) -> i32 {
        self.voltage = tap_millivolts * 2 + DIVIDER_OFFSET_MV;
        self.average.update(self.voltage)
    }

    /// Most recent battery voltage [mV]
    pub fn voltage(&self) -> i32 {
        self.voltage
    }

    /// Averaged battery voltage [mV]
    pub fn average(&self) -> i32 {
        self.average.average()
    }
}

impl Default for Battery {
    fn default() -> Self {
        Self::new()
    }
}

// Resting 1S LiPo voltage against remaining charge.
const CHARGE_CURVE: [(f32, f32); 21] = [
    (4.20, 100.0),
    (4.15, 95.0),
    (4.11, 90.0),
    (4.08, 85.0),
    (4.02, 80.0),
    (3.98, 75.0),
    (3.95, 70.0),
    (3.91, 65.0),
    (3.87, 60.0),
    (3.85, 55.0),
    (3.84, 50.0),
    (3.82, 45.0),
    (3.80, 40.0),
    (3.79, 35.0),
    (3.77, 30.0),
    (3.75, 25.0),
    (3.73, 20.0),
    (3.71, 15.0),
    (3.69, 10.0),
    (3.61, 5.0),
    (3.27, 0.0),
];

/// Remaining charge of a 1S LiPo [%], interpolated between curve points.
pub fn lipo_1s_charge_percent(voltage: f32) -> f32 {
    if voltage >= CHARGE_CURVE[0].0 {
        return 100.0;
    }
    for segment in CHARGE_CURVE.windows(2) {
        let (high_voltage, high_percent) = segment[0];
        let (low_voltage, low_percent) = segment[1];
        if voltage >= low_voltage {
            let ratio = (voltage - low_voltage) / (high_voltage - low_voltage);
            return low_percent + (high_percent - low_percent) * ratio;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::*;

    #[test]
    fn battery_undoes_divider() {
        let mut battery = Battery::new();
        assert_eq!(battery.update(1900), 3900);
        assert_eq!(battery.voltage(), 3900);
        assert_eq!(battery.average(), 3900);
    }

    #[test]
    fn battery_average_lags_instantaneous() {
        let mut battery = Battery::new();
        battery.update(1900);
        let average = battery.update(2000);
        assert_eq!(battery.voltage(), 4100);
        assert!(average >= 3900 && average < battery.voltage());
    }

    #[test]
    fn charge_percent_handles_out_of_range() {
        assert_eq!(lipo_1s_charge_percent(55.0), 100.0);
        assert_eq!(lipo_1s_charge_percent(4.2), 100.0);
        assert_eq!(lipo_1s_charge_percent(3.27), 0.0);
        assert_eq!(lipo_1s_charge_percent(-42.0), 0.0);
    }

    #[test]
    fn charge_percent_interpolates() {
        assert_float_absolute_eq!(lipo_1s_charge_percent(4.175), 97.5, 1e-3);
        assert_float_absolute_eq!(lipo_1s_charge_percent(4.035), 81.25, 1e-3);
        assert_float_absolute_eq!(lipo_1s_charge_percent(3.28), 0.147, 1e-3);
    }
}
