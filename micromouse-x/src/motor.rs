/// High-side ratios for the two inputs of one H-bridge, each in [0, 1].
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeDuty {
    pub in1: f32,
    pub in2: f32,
}

impl BridgeDuty {
    /// Both inputs high, shorting the motor windings.
    pub const fn brake() -> Self {
        Self { in1: 1.0, in2: 1.0 }
    }

    /// Both inputs low, letting the motor spin freely.
    pub const fn coast() -> Self {
        Self { in1: 0.0, in2: 0.0 }
    }

    /// Splits a signed motor voltage into input duties for the present battery voltage.
    /// Forward drives IN1 and holds IN2 low; reverse the opposite.
    pub fn drive(motor_mv: i32, battery_mv: i32) -> Self {
        if battery_mv <= 0 {
            return Self::coast();
        }
        let duty = (motor_mv as f32 / battery_mv as f32).clamp(-1.0, 1.0);
        if duty >= 0.0 {
            Self { in1: duty, in2: 0.0 }
        } else {
            Self {
                in1: 0.0,
                in2: -duty,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::*;

    #[test]
    fn drive_splits_direction() {
        let forward = BridgeDuty::drive(2000, 4000);
        assert_f32_near!(forward.in1, 0.5);
        assert_f32_near!(forward.in2, 0.0);

        let reverse = BridgeDuty::drive(-1000, 4000);
        assert_f32_near!(reverse.in1, 0.0);
        assert_f32_near!(reverse.in2, 0.25);
    }

    #[test]
    fn drive_saturates_at_battery_voltage() {
        assert_eq!(BridgeDuty::drive(5000, 4000), BridgeDuty { in1: 1.0, in2: 0.0 });
        assert_eq!(BridgeDuty::drive(-5000, 4000), BridgeDuty { in1: 0.0, in2: 1.0 });
    }

    #[test]
    fn drive_without_battery_coasts() {
        assert_eq!(BridgeDuty::drive(1000, 0), BridgeDuty::coast());
    }
}
