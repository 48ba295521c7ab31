use defmt::*;
use embassy_nrf::gpio;
use embassy_nrf::pwm;
use embassy_time::Timer;

use micromouse_x::buzzer::{Melody, Note};

use crate::datatypes::BuzzerQueue;

/// Piezo buzzer on a single PWM channel.
pub struct Buzzer<'a, T: pwm::Instance> {
    pwm: pwm::SimplePwm<'a, T>,
}

impl<T: pwm::Instance> Buzzer<'_, T> {
    pub fn new(pwm_peripheral: T, pin: gpio::AnyPin) -> Self {
        let pwm = pwm::SimplePwm::new_1ch(pwm_peripheral, pin);
        // 4 MHz keeps the period of the lowest note within the 15 bit counter
        pwm.set_prescaler(pwm::Prescaler::Div4);
        pwm.disable();
        Self { pwm }
    }

    pub async fn play_note(self: &mut Self, note: &Note) {
        if note.frequency == 0 {
            self.pwm.disable();
        } else {
            self.pwm.enable();
            self.pwm.set_period(note.frequency);
            self.pwm.set_duty(0, self.pwm.max_duty() / 2);
        }
        Timer::after_millis(u64::from(note.duration_ms)).await;
    }

    pub async fn play(self: &mut Self, melody: Melody) {
        for note in melody.notes() {
            self.play_note(note).await;
        }
        self.pwm.disable();
    }
}

#[embassy_executor::task]
pub async fn buzzer_task(
    mut buzzer: Buzzer<'static, embassy_nrf::peripherals::PWM1>,
    queue: &'static BuzzerQueue,
) -> ! {
    loop {
        let melody = queue.receive().await;
        debug!("Playing {:?}", melody);
        buzzer.play(melody).await;
    }
}
