//! Scaling and offset calibration for the 6-axis IMU.
//!
//! The sensor itself lives in the firmware crate; this module converts its raw output and fits the
//! offsets used to correct it.

use crate::datatypes::Vec3f;

/// Gyroscope sensitivity at ±2000 dps [mdps/LSB]
pub const GYRO_SENSITIVITY: f32 = 70.0;
/// Accelerometer sensitivity at ±2 g [mg/LSB]
pub const ACCEL_SENSITIVITY: f32 = 0.061;
/// Weight of one LSB in the accelerometer user offset registers (2^-10 g) [mg/LSB]
pub const ACCEL_USER_OFFSET_WEIGHT: f32 = 1000.0 / 1024.0;
/// User offsets written at start-up until a calibration has been run
pub const DEFAULT_ACCEL_USER_OFFSETS: [i8; 3] = [-1, -46, 5];
/// Output data rate of both sensors [Hz]
pub const OUTPUT_DATA_RATE: f32 = 1660.0;
/// Samples taken by a default calibration
pub const DEFAULT_CALIBRATION_SAMPLES: u32 = 10000;

const ONE_G_MG: f64 = 1000.0;

/// Raw output registers, gyro then accel, each X/Y/Z.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawImuSample {
    pub gyro: [i16; 3],
    pub accel: [i16; 3],
}

/// Scaled IMU reading. Gyro is in mdps, accel in mg.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuSample {
    pub gyro: Vec3f,
    pub accel: Vec3f,
}

impl ImuSample {
    /// Scales a raw sample and subtracts the software gyro bias [mdps].
    pub fn from_raw(raw: &RawImuSample, gyro_bias: Vec3f) -> Self {
        let gyro = Vec3f::new(
            f32::from(raw.gyro[0]),
            f32::from(raw.gyro[1]),
            f32::from(raw.gyro[2]),
        ) * GYRO_SENSITIVITY;
        let accel = Vec3f::new(
            f32::from(raw.accel[0]),
            f32::from(raw.accel[1]),
            f32::from(raw.accel[2]),
        ) * ACCEL_SENSITIVITY;

        Self {
            gyro: gyro - gyro_bias,
            accel,
        }
    }
}

/// Least-squares line `y = slope * t + intercept`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinearFit {
    pub slope: f32,
    pub intercept: f32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuOffsets {
    /// Values for the accelerometer user offset registers
    pub accel_user_offsets: [i8; 3],
    /// Subtracted from every gyro reading [mdps]
    pub gyro_bias: Vec3f,
    pub accel_fit: [LinearFit; 3],
    pub gyro_fit: [LinearFit; 3],
}

impl Default for ImuOffsets {
    fn default() -> Self {
        Self {
            accel_user_offsets: DEFAULT_ACCEL_USER_OFFSETS,
            gyro_bias: Vec3f::zeroed(),
            accel_fit: [LinearFit::default(); 3],
            gyro_fit: [LinearFit::default(); 3],
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct AxisSums {
    y: [f64; 3],
    ty: [f64; 3],
}

impl AxisSums {
    fn add(&mut self, t: f64, sample: Vec3f) {
        for (axis, value) in [sample.x, sample.y, sample.z].into_iter().enumerate() {
            self.y[axis] += f64::from(value);
            self.ty[axis] += t * f64::from(value);
        }
    }
}

/// Fits a line through each IMU axis over a fixed number of samples taken at the output data rate.
///
/// Expects the mouse to sit level and stationary while sampling, with the user offset registers
/// cleared. The intercepts are the offsets; the slopes show drift during the run.
#[derive(Copy, Clone, Debug)]
pub struct ImuOffsetsBuilder {
    current_sample_count: u32,
    target_sample_count: u32,
    sample_period: f64,
    sum_t: f64,
    sum_tt: f64,
    accel: AxisSums,
    gyro: AxisSums,
}

#[derive(Copy, Clone, Debug)]
pub enum ImuOffsetState {
    Ready(ImuOffsets),
    InProgress(ImuOffsetsBuilder),
}

impl From<ImuOffsets> for ImuOffsetState {
    fn from(value: ImuOffsets) -> Self {
        ImuOffsetState::Ready(value)
    }
}

impl Default for ImuOffsetState {
    fn default() -> Self {
        ImuOffsetState::from(ImuOffsets::default())
    }
}

impl ImuOffsetsBuilder {
    pub fn new(target_sample_count: u32) -> Self {
        Self {
            current_sample_count: 0,
            target_sample_count: target_sample_count.max(2),
            sample_period: 1.0 / f64::from(OUTPUT_DATA_RATE),
            sum_t: 0.0,
            sum_tt: 0.0,
            accel: AxisSums::default(),
            gyro: AxisSums::default(),
        }
    }

    pub fn progress(&self) -> (u32, u32) {
        (self.current_sample_count, self.target_sample_count)
    }

    /// Feeds one scaled sample, taken without any gyro bias applied.
    pub fn update(mut self, sample: ImuSample) -> ImuOffsetState {
        let t = self.sample_period * f64::from(self.current_sample_count);
        self.sum_t += t;
        self.sum_tt += t * t;
        self.accel.add(t, sample.accel);
        self.gyro.add(t, sample.gyro);
        self.current_sample_count += 1;

        if self.current_sample_count == self.target_sample_count {
            ImuOffsetState::Ready(self.finish())
        } else {
            ImuOffsetState::InProgress(self)
        }
    }

    fn fit(&self, sums: &AxisSums, axis: usize) -> LinearFit {
        let n = f64::from(self.current_sample_count);
        let denominator = n * self.sum_tt - self.sum_t * self.sum_t;
        let slope = if denominator > f64::EPSILON {
            (n * sums.ty[axis] - self.sum_t * sums.y[axis]) / denominator
        } else {
            0.0
        };
        let intercept = (sums.y[axis] - slope * self.sum_t) / n;

        LinearFit {
            slope: slope as f32,
            intercept: intercept as f32,
        }
    }

    fn finish(&self) -> ImuOffsets {
        let accel_fit = [0, 1, 2].map(|axis| self.fit(&self.accel, axis));
        let gyro_fit = [0, 1, 2].map(|axis| self.fit(&self.gyro, axis));

        // Z reads +1 g when level
        let gravity = [0.0, 0.0, ONE_G_MG];
        let mut accel_user_offsets = [0i8; 3];
        for axis in 0..3 {
            let offset = (f64::from(accel_fit[axis].intercept) - gravity[axis])
                / f64::from(ACCEL_USER_OFFSET_WEIGHT);
            accel_user_offsets[axis] = offset.clamp(f64::from(i8::MIN), f64::from(i8::MAX)) as i8;
        }

        ImuOffsets {
            accel_user_offsets,
            gyro_bias: Vec3f::new(
                gyro_fit[0].intercept,
                gyro_fit[1].intercept,
                gyro_fit[2].intercept,
            ),
            accel_fit,
            gyro_fit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::*;

    #[test]
    fn from_raw_scales_and_removes_bias() {
        let raw = RawImuSample {
            gyro: [10, -20, 100],
            accel: [0, 1000, 16393],
        };
        let sample = ImuSample::from_raw(&raw, Vec3f::new(0.0, 0.0, 700.0));
        assert_f32_near!(sample.gyro.x, 700.0);
        assert_f32_near!(sample.gyro.y, -1400.0);
        assert_f32_near!(sample.gyro.z, 6300.0);
        assert_float_absolute_eq!(sample.accel.y, 61.0, 1e-3);
        assert_float_absolute_eq!(sample.accel.z, 999.973, 1e-3);
    }

    #[test]
    fn offsets_fit_constant_readings() {
        let sample = ImuSample {
            gyro: Vec3f::new(140.0, -70.0, 35.0),
            accel: Vec3f::new(10.0, -45.0, 1020.0),
        };
        let mut state = ImuOffsetState::InProgress(ImuOffsetsBuilder::new(100));
        for _ in 0..100 {
            state = match state {
                ImuOffsetState::InProgress(builder) => builder.update(sample),
                ready => ready,
            };
        }

        let ImuOffsetState::Ready(offsets) = state else {
            panic!("calibration did not finish");
        };
        assert_float_absolute_eq!(offsets.gyro_bias.x, 140.0, 1e-3);
        assert_float_absolute_eq!(offsets.gyro_bias.y, -70.0, 1e-3);
        assert_float_absolute_eq!(offsets.gyro_bias.z, 35.0, 1e-3);
        assert_float_absolute_eq!(offsets.gyro_fit[0].slope, 0.0, 1e-3);
        // 10 mg, -45 mg and 20 mg over a 0.977 mg weight
        assert_eq!(offsets.accel_user_offsets, [10, -46, 20]);
    }

    #[test]
    fn offsets_fit_drifting_readings() {
        let mut builder = ImuOffsetsBuilder::new(1000);
        let period = 1.0 / OUTPUT_DATA_RATE;
        for i in 0..999 {
            let t = i as f32 * period;
            let sample = ImuSample {
                gyro: Vec3f::new(0.0, 0.0, 50.0 + 100.0 * t),
                accel: Vec3f::new(0.0, 0.0, 1000.0),
            };
            match builder.update(sample) {
                ImuOffsetState::InProgress(next) => builder = next,
                ImuOffsetState::Ready(_) => panic!("finished early"),
            }
        }
        assert_eq!(builder.progress(), (999, 1000));

        let last = ImuSample {
            gyro: Vec3f::new(0.0, 0.0, 50.0 + 100.0 * 999.0 * period),
            accel: Vec3f::new(0.0, 0.0, 1000.0),
        };
        let ImuOffsetState::Ready(offsets) = builder.update(last) else {
            panic!("calibration did not finish");
        };
        assert_float_absolute_eq!(offsets.gyro_fit[2].slope, 100.0, 1e-2);
        assert_float_absolute_eq!(offsets.gyro_bias.z, 50.0, 1e-2);
        assert_eq!(offsets.accel_user_offsets, [0, 0, 0]);
    }

    #[test]
    fn user_offsets_saturate() {
        let sample = ImuSample {
            gyro: Vec3f::zeroed(),
            accel: Vec3f::new(500.0, -500.0, 1000.0),
        };
        let mut builder = ImuOffsetsBuilder::new(2);
        if let ImuOffsetState::InProgress(next) = builder.update(sample) {
            builder = next;
        }
        let ImuOffsetState::Ready(offsets) = builder.update(sample) else {
            panic!("calibration did not finish");
        };
        assert_eq!(offsets.accel_user_offsets, [127, -128, 0]);
    }
}
