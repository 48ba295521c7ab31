use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive};
use embassy_time::{Duration, Timer};

use micromouse_x::parameters::PHOTO_SENSOR_COUNT;
use micromouse_x::photo::PhotoResult;

use crate::adc::{AdcSamples, AnalogInputs};

// Photo transistor rise time after an emitter turns on
const SETTLE_TIME: Duration = Duration::from_micros(20);

/// IR emitters for the four wall sensors, in the same order as the receiver channels.
pub struct Photo {
    emitters: [Output<'static>; PHOTO_SENSOR_COUNT],
}

impl Photo {
    pub fn new(emitter_pins: [AnyPin; PHOTO_SENSOR_COUNT]) -> Self {
        Self {
            emitters: emitter_pins.map(|pin| Output::new(pin, Level::Low, OutputDrive::HighDrive)),
        }
    }

    /// Samples every receiver with all emitters off, then flashes each emitter in turn.
    ///
    /// Returns the per-sensor results and the ambient conversion, which also carries the battery
    /// channel.
    pub async fn update(
        self: &mut Self,
        adc: &mut AnalogInputs,
    ) -> ([PhotoResult; PHOTO_SENSOR_COUNT], AdcSamples) {
        let ambient = adc.sample().await;

        let mut results = [PhotoResult::default(); PHOTO_SENSOR_COUNT];
        for (i, emitter) in self.emitters.iter_mut().enumerate() {
            emitter.set_high();
            Timer::after(SETTLE_TIME).await;
            let flash = adc.sample().await;
            emitter.set_low();

            results[i] = PhotoResult {
                ambient: ambient[i],
                flash: flash[i],
            };
        }

        (results, ambient)
    }
}
