use embassy_nrf::peripherals;
use embassy_nrf::spim::Spim;

use micromouse_x::datatypes::Vec3f;
use micromouse_x::imu::{ImuOffsets, ImuSample, RawImuSample};
use micromouse_x::sensor::SensorInputs;

use crate::adc::{battery_tap_millivolts, AnalogInputs};
use crate::encoder::Encoder;
use crate::imu::Imu;
use crate::photo::Photo;
use crate::xerror::XResult;

/// Raw readings from one pass over every sensor.
#[derive(Copy, Clone, Debug, Default, defmt::Format)]
pub struct SensorReadings {
    pub inputs: SensorInputs,
    /// Unscaled IMU output, used while calibrating
    pub raw_imu: RawImuSample,
}

/// Every sensor on the mouse together with the buses they sit on.
pub struct SensorDevices {
    pub imu_spim: Spim<'static, peripherals::TWISPI0>,
    pub imu: Imu,
    pub encoder_spim: Spim<'static, peripherals::TWISPI1>,
    pub encoder_left: Encoder,
    pub encoder_right: Encoder,
    pub adc: AnalogInputs,
    pub photo: Photo,
    gyro_bias: Vec3f,
}

impl SensorDevices {
    pub fn new(
        imu_spim: Spim<'static, peripherals::TWISPI0>,
        imu: Imu,
        encoder_spim: Spim<'static, peripherals::TWISPI1>,
        encoder_left: Encoder,
        encoder_right: Encoder,
        adc: AnalogInputs,
        photo: Photo,
    ) -> Self {
        Self {
            imu_spim,
            imu,
            encoder_spim,
            encoder_left,
            encoder_right,
            adc,
            photo,
            gyro_bias: Vec3f::zeroed(),
        }
    }

    pub async fn configure(self: &mut Self, accel_user_offsets: [i8; 3]) -> XResult<()> {
        self.imu
            .configure(&mut self.imu_spim, accel_user_offsets)
            .await?;
        self.encoder_left.configure(&mut self.encoder_spim).await?;
        self.encoder_right.configure(&mut self.encoder_spim).await?;
        Ok(())
    }

    pub async fn read(self: &mut Self) -> XResult<SensorReadings> {
        let raw_imu = self.imu.read(&mut self.imu_spim).await?;
        let encoder_left = self.encoder_left.update(&mut self.encoder_spim).await?;
        let encoder_right = self.encoder_right.update(&mut self.encoder_spim).await?;
        let (photo, ambient) = self.photo.update(&mut self.adc).await;

        Ok(SensorReadings {
            inputs: SensorInputs {
                battery_tap_millivolts: battery_tap_millivolts(&ambient),
                photo,
                imu: ImuSample::from_raw(&raw_imu, self.gyro_bias),
                encoder_right,
                encoder_left,
            },
            raw_imu,
        })
    }

    /// Removes every IMU offset so calibration sees the sensor's own output.
    pub async fn clear_imu_offsets(self: &mut Self) -> XResult<()> {
        self.gyro_bias = Vec3f::zeroed();
        self.imu
            .set_accel_user_offsets(&mut self.imu_spim, [0; 3])
            .await
    }

    pub async fn apply_imu_offsets(self: &mut Self, offsets: &ImuOffsets) -> XResult<()> {
        self.gyro_bias = offsets.gyro_bias;
        self.imu
            .set_accel_user_offsets(&mut self.imu_spim, offsets.accel_user_offsets)
            .await
    }
}
