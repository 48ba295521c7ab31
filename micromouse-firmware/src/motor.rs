use embassy_nrf::gpio;
use embassy_nrf::pwm;

use micromouse_x::datatypes::MotorVoltages;
use micromouse_x::motor::BridgeDuty;

// 16 MHz / 1 / 800 = 20 kHz, above the audible range
const MAX_DUTY: f32 = 800.0;

const LEFT_IN1: usize = 0;
const LEFT_IN2: usize = 1;
const RIGHT_IN1: usize = 2;
const RIGHT_IN2: usize = 3;

/// Both drive motors, each on an H-bridge with two PWM inputs.
pub struct Motors<'a, T: pwm::Instance> {
    pwm: pwm::SimplePwm<'a, T>,
    enabled: bool,
    voltages: MotorVoltages,
}

impl<T: pwm::Instance> Motors<'_, T> {
    pub fn new(
        pwm_peripheral: T,
        left_in1: gpio::AnyPin,
        left_in2: gpio::AnyPin,
        right_in1: gpio::AnyPin,
        right_in2: gpio::AnyPin,
    ) -> Self {
        let pwm = pwm::SimplePwm::new_4ch(pwm_peripheral, left_in1, left_in2, right_in1, right_in2);
        pwm.set_prescaler(pwm::Prescaler::Div1);
        pwm.set_max_duty(MAX_DUTY as u16);

        let mut instance = Self {
            pwm,
            enabled: true,
            voltages: MotorVoltages::zeroed(),
        };
        instance.disable();

        instance
    }

    pub fn enable(self: &mut Self) {
        self.enabled = true;
    }

    /// Lets both motors coast until enabled again.
    pub fn disable(self: &mut Self) {
        self.coast();
        self.enabled = false;
    }

    pub fn is_enabled(self: &Self) -> bool {
        self.enabled
    }

    /// Applies signed motor voltages [V] scaled to the present battery voltage [V].
    pub fn speed(self: &mut Self, voltages: MotorVoltages, battery_voltage: f32) {
        if !self.enabled {
            return;
        }
        let battery_mv = (battery_voltage * 1000.0) as i32;
        self.set_bridge(
            LEFT_IN1,
            LEFT_IN2,
            BridgeDuty::drive((voltages.left * 1000.0) as i32, battery_mv),
        );
        self.set_bridge(
            RIGHT_IN1,
            RIGHT_IN2,
            BridgeDuty::drive((voltages.right * 1000.0) as i32, battery_mv),
        );
        self.voltages = voltages;
    }

    pub fn brake(self: &mut Self) {
        self.set_bridge(LEFT_IN1, LEFT_IN2, BridgeDuty::brake());
        self.set_bridge(RIGHT_IN1, RIGHT_IN2, BridgeDuty::brake());
        self.voltages = MotorVoltages::zeroed();
    }

    pub fn coast(self: &mut Self) {
        self.set_bridge(LEFT_IN1, LEFT_IN2, BridgeDuty::coast());
        self.set_bridge(RIGHT_IN1, RIGHT_IN2, BridgeDuty::coast());
        self.voltages = MotorVoltages::zeroed();
    }

    /// Last voltages applied [V]
    pub fn voltages(self: &Self) -> MotorVoltages {
        self.voltages
    }

    fn set_bridge(self: &mut Self, in1: usize, in2: usize, duty: BridgeDuty) {
        self.set_single(in1, duty.in1);
        self.set_single(in2, duty.in2);
    }

    fn set_single(self: &mut Self, channel: usize, output_ratio: f32) {
        // PWM duty is inverted (for an active-high signal)
        let output_ratio = output_ratio.clamp(0.0, 1.0);
        let duty = (MAX_DUTY - (output_ratio * MAX_DUTY)) as u16;

        self.pwm.set_duty(channel, duty);
    }
}
