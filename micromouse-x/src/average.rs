use heapless::Deque;

/// Moving average over the last `N` integer samples.
///
/// The first sample after construction (or `reset`) fills the whole window, so the average starts
/// at the first reading instead of ramping up from zero.
pub struct MovingAverage<const N: usize> {
    samples: Deque<i32, N>,
    sum: i64,
}

impl<const N: usize> MovingAverage<N> {
    pub const fn new() -> Self {
        Self {
            samples: Deque::new(),
            sum: 0,
        }
    }

    pub fn update(&mut self, sample: i32) -> i32 {
        if self.samples.is_empty() {
            while self.samples.push_back(sample).is_ok() {
                self.sum += i64::from(sample);
            }
        } else {
            if self.samples.is_full() {
                if let Some(oldest) = self.samples.pop_front() {
                    self.sum -= i64::from(oldest);
                }
            }
            if self.samples.push_back(sample).is_ok() {
                self.sum += i64::from(sample);
            }
        }

        self.average()
    }

    pub fn average(&self) -> i32 {
        match self.samples.len() {
            0 => 0,
            len => (self.sum / len as i64) as i32,
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = 0;
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_fills_window() {
        let mut average = MovingAverage::<8>::new();
        assert_eq!(average.average(), 0);
        assert_eq!(average.update(4000), 4000);
        assert_eq!(average.update(4800), 4100);
    }

    #[test]
    fn old_samples_fall_out_of_window() {
        let mut average = MovingAverage::<4>::new();
        average.update(10);
        for _ in 0..4 {
            average.update(30);
        }
        assert_eq!(average.average(), 30);
    }

    #[test]
    fn reset_refills_on_next_sample() {
        let mut average = MovingAverage::<4>::new();
        average.update(10);
        average.reset();
        assert_eq!(average.average(), 0);
        assert_eq!(average.update(-20), -20);
    }
}
