//! Wall detection from the four reflective IR sensors.

use postcard::experimental::max_size::MaxSize;
use serde::{Deserialize, Serialize};

use crate::parameters::{PHOTO_SENSOR_COUNT, WALL_REFERENCE, WALL_THRESHOLD};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhotoPosition {
    Left90 = 0,
    Left45 = 1,
    Right45 = 2,
    Right90 = 3,
}

impl PhotoPosition {
    pub const ALL: [PhotoPosition; PHOTO_SENSOR_COUNT] = [
        PhotoPosition::Left90,
        PhotoPosition::Left45,
        PhotoPosition::Right45,
        PhotoPosition::Right90,
    ];
}

/// Raw ADC counts with the emitter off and on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhotoResult {
    pub ambient: i16,
    pub flash: i16,
}

impl PhotoResult {
    /// Light reflected back from the emitter.
    pub fn reflection(&self) -> i16 {
        self.flash.saturating_sub(self.ambient).max(0)
    }
}

#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WallState {
    pub exist: bool,
    /// Reflection minus the centred reference; positive means closer than centred.
    pub error: i16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WallSensor {
    threshold: i16,
    reference: i16,
}

impl WallSensor {
    pub const fn new(threshold: i16, reference: i16) -> Self {
        Self {
            threshold,
            reference,
        }
    }

    pub fn evaluate(&self, result: &PhotoResult) -> WallState {
        let reflection = result.reflection();
        WallState {
            exist: reflection > self.threshold,
            error: reflection.saturating_sub(self.reference),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhotoWalls {
    pub left90: WallState,
    pub left45: WallState,
    pub right45: WallState,
    pub right90: WallState,
}

impl PhotoWalls {
    pub fn front(&self) -> bool {
        self.left90.exist || self.right90.exist
    }

    pub fn left(&self) -> bool {
        self.left45.exist
    }

    pub fn right(&self) -> bool {
        self.right45.exist
    }

    pub fn as_array(&self) -> [WallState; PHOTO_SENSOR_COUNT] {
        [self.left90, self.left45, self.right45, self.right90]
    }
}

pub struct WallDetector {
    sensors: [WallSensor; PHOTO_SENSOR_COUNT],
}

impl WallDetector {
    pub fn new(
        thresholds: [i16; PHOTO_SENSOR_COUNT],
        references: [i16; PHOTO_SENSOR_COUNT],
    ) -> Self {
        let mut sensors = [WallSensor::new(0, 0); PHOTO_SENSOR_COUNT];
        for (i, sensor) in sensors.iter_mut().enumerate() {
            *sensor = WallSensor::new(thresholds[i], references[i]);
        }
        Self { sensors }
    }

    pub fn evaluate(&self, results: &[PhotoResult; PHOTO_SENSOR_COUNT]) -> PhotoWalls {
        let state = |position: PhotoPosition| {
            self.sensors[position as usize].evaluate(&results[position as usize])
        };
        PhotoWalls {
            left90: state(PhotoPosition::Left90),
            left45: state(PhotoPosition::Left45),
            right45: state(PhotoPosition::Right45),
            right90: state(PhotoPosition::Right90),
        }
    }
}

impl Default for WallDetector {
    fn default() -> Self {
        Self::new(WALL_THRESHOLD, WALL_REFERENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(ambient: i16, flash: i16) -> PhotoResult {
        PhotoResult { ambient, flash }
    }

    #[test]
    fn reflection_removes_ambient_light() {
        assert_eq!(result(100, 600).reflection(), 500);
        assert_eq!(result(600, 100).reflection(), 0);
    }

    #[test]
    fn sensor_thresholds_and_errors() {
        let sensor = WallSensor::new(150, 420);
        assert_eq!(
            sensor.evaluate(&result(50, 520)),
            WallState {
                exist: true,
                error: 50
            }
        );
        assert_eq!(
            sensor.evaluate(&result(50, 150)),
            WallState {
                exist: false,
                error: -320
            }
        );
    }

    #[test]
    fn detector_maps_positions() {
        let detector = WallDetector::new([100; 4], [400; 4]);
        let walls = detector.evaluate(&[
            result(0, 50),
            result(0, 500),
            result(0, 20),
            result(0, 300),
        ]);
        assert!(!walls.left90.exist);
        assert!(walls.left45.exist);
        assert!(!walls.right45.exist);
        assert!(walls.right90.exist);
        assert!(walls.front());
        assert!(walls.left());
        assert!(!walls.right());
        assert_eq!(walls.left45.error, 100);
    }
}
