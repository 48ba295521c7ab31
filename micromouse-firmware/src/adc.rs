use embassy_nrf::saadc::Saadc;

use micromouse_x::adc::raw_to_millivolts;
use micromouse_x::parameters::PHOTO_SENSOR_COUNT;

/// Channels in conversion order: the four photo receivers, then the battery divider tap.
pub const ADC_CHANNEL_COUNT: usize = PHOTO_SENSOR_COUNT + 1;
const BATTERY_CHANNEL: usize = PHOTO_SENSOR_COUNT;

pub type AdcSamples = [i16; ADC_CHANNEL_COUNT];

pub struct AnalogInputs {
    adc: Saadc<'static, ADC_CHANNEL_COUNT>,
}

impl AnalogInputs {
    pub async fn new(adc: Saadc<'static, ADC_CHANNEL_COUNT>) -> Self {
        adc.calibrate().await;
        Self { adc }
    }

    /// One conversion of every channel.
    pub async fn sample(self: &mut Self) -> AdcSamples {
        let mut samples = [0i16; ADC_CHANNEL_COUNT];
        self.adc.sample(&mut samples).await;
        samples
    }
}

pub fn battery_tap_millivolts(samples: &AdcSamples) -> i32 {
    raw_to_millivolts(samples[BATTERY_CHANNEL])
}
