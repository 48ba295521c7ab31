use core::future::{pending, Future, Pending};
use core::pin::Pin;
use core::task::{Context, Poll};

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_nrf::peripherals;
use embassy_nrf::pwm::{
    self, SequenceConfig, SequenceLoad, SequencePwm, SingleSequenceMode, SingleSequencer,
};
use embassy_time::{Duration, Timer};

use micromouse_x::indicator::{sequence_len, state_pattern, Indicator, BIT_PERIOD_TICKS};

use crate::datatypes::MouseStatus;

pub const LED_COUNT: usize = 4;
const SEQUENCE_LEN: usize = sequence_len(LED_COUNT);

const BLINK_INTERVAL: Duration = Duration::from_millis(500);
// Longer than one frame including the latch
const FRAME_TIME: Duration = Duration::from_micros(300);

pub type IndicatorPwm = SequencePwm<'static, peripherals::PWM2>;

/// Sequence PWM settings for the WS2812 bit timing.
pub fn pwm_config() -> pwm::Config {
    let mut config = pwm::Config::default();
    config.sequence_load = SequenceLoad::Common;
    config.prescaler = pwm::Prescaler::Div1;
    config.max_duty = BIT_PERIOD_TICKS;
    config
}

enum TimerOrPending {
    Timer(Timer),
    Pending(Pending<()>),
}

impl Future for TimerOrPending {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::get_mut(self) {
            Self::Timer(timer) => Pin::new(timer).poll(cx),
            Self::Pending(pending_) => Pin::new(pending_).poll(cx),
        }
    }
}

async fn show(
    pwm: &mut IndicatorPwm,
    indicator: &Indicator<LED_COUNT>,
    words: &mut [u16; SEQUENCE_LEN],
) {
    let Some(len) = indicator.encode(words) else {
        return;
    };
    let sequencer = SingleSequencer::new(pwm, &words[..len], SequenceConfig::default());
    if let Err(e) = sequencer.start(SingleSequenceMode::Times(1)) {
        warn!("Failed to start indicator sequence: {:?}", e);
        return;
    }
    Timer::after(FRAME_TIME).await;
    // Dropping the sequencer stops the PWM
}

#[embassy_executor::task]
pub async fn indicator_task(mut pwm: IndicatorPwm, status: &'static MouseStatus) -> ! {
    let mut indicator = Indicator::<LED_COUNT>::new();
    let mut words = [0u16; SEQUENCE_LEN];
    let mut state = status.get();
    let mut lit = true;

    loop {
        let (rgb, blink) = state_pattern(state);
        if lit {
            indicator.set_all(rgb);
        } else {
            indicator.clear();
        }
        show(&mut pwm, &indicator, &mut words).await;

        let blink_future = if blink {
            TimerOrPending::Timer(Timer::after(BLINK_INTERVAL))
        } else {
            TimerOrPending::Pending(pending())
        };

        // Wait for next blink interval or mouse state change
        match select(blink_future, status.wait_change()).await {
            Either::First(_) => lit = !lit,
            Either::Second(new_state) => {
                state = new_state;
                lit = true;
            }
        }
    }
}
