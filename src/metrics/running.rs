// --- File: src/metrics/running.rs ---

//! Streaming statistics.
//!
//! Online (Welford) algorithms: numerically stable mean and std in a single
//! pass without keeping the values around.

/// Online mean.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    mean: f64,
    count: usize,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
    }

    /// Current mean, NaN before the first value.
    pub fn compute(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }
}

/// Online standard deviation (Welford's algorithm).
#[derive(Debug, Clone, Default)]
pub struct RunningStd {
    count: usize,
    mean: f64,
    m2: f64, // sum of squared differences from the mean
}

impl RunningStd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, 0 for fewer than two values.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample std.
    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Online min and max. NaN inputs poison both ends.
#[derive(Debug, Clone)]
pub struct RunningMinMax {
    min: f64,
    max: f64,
    count: usize,
    saw_nan: bool,
}

impl RunningMinMax {
    pub fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
            saw_nan: false,
        }
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        if value.is_nan() {
            self.saw_nan = true;
        }
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn min(&self) -> Option<f64> {
        match self.count {
            0 => None,
            _ if self.saw_nan => Some(f64::NAN),
            _ => Some(self.min),
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self.count {
            0 => None,
            _ if self.saw_nan => Some(f64::NAN),
            _ => Some(self.max),
        }
    }
}

impl Default for RunningMinMax {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let mut rm = RunningMean::new();
        assert!(rm.compute().is_nan());
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            rm.update(v);
        }

        assert!((rm.compute() - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_running_std() {
        let mut rs = RunningStd::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            rs.update(v);
        }

        assert!((rs.mean() - 5.0).abs() < 1e-10);
        assert!((rs.variance() - 32.0 / 7.0).abs() < 1e-10);
        assert_eq!(rs.count(), 8);
    }

    #[test]
    fn test_single_value_std_is_zero() {
        let mut rs = RunningStd::new();
        rs.update(3.0);
        assert_eq!(rs.std(), 0.0);
    }

    #[test]
    fn test_running_min_max() {
        let mut rmm = RunningMinMax::new();
        assert_eq!(rmm.min(), None);
        for v in [5.0, 2.0, 8.0, 1.0, 9.0] {
            rmm.update(v);
        }

        assert_eq!(rmm.min(), Some(1.0));
        assert_eq!(rmm.max(), Some(9.0));

        rmm.update(f64::NAN);
        assert!(rmm.max().unwrap().is_nan());
    }
}
