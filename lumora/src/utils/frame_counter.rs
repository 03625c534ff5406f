use std::collections::VecDeque;
use std::time::Duration;

const DEFAULT_RUNNING_SIZE: usize = 60;

/// Rolling average over the last 60 frame times.
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    frame_times: VecDeque<f32>,
}

impl FrameCounter {
    pub fn new_frame(&mut self, delta_time: f32) {
        if self.frame_times.len() >= DEFAULT_RUNNING_SIZE {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(delta_time);
    }

    pub fn new_frame_from_duration(&mut self, delta: Duration) {
        self.new_frame(delta.as_secs_f32());
    }

    pub fn samples(&self) -> usize {
        self.frame_times.len()
    }

    pub fn mean_delta_time(&self) -> f32 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32
    }

    pub fn fps(&self) -> u32 {
        let mean = self.mean_delta_time();
        if mean <= f32::EPSILON {
            return 0;
        }
        (1.0 / mean).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counter_reports_zero() {
        let counter = FrameCounter::default();
        assert_eq!(counter.fps(), 0);
        assert_eq!(counter.mean_delta_time(), 0.0);
    }

    #[test]
    fn window_keeps_the_latest_samples() {
        let mut counter = FrameCounter::default();
        for _ in 0..DEFAULT_RUNNING_SIZE {
            counter.new_frame(1.0);
        }
        for _ in 0..DEFAULT_RUNNING_SIZE {
            counter.new_frame(0.02);
        }
        assert_eq!(counter.samples(), DEFAULT_RUNNING_SIZE);
        assert_eq!(counter.fps(), 50);
    }
}
