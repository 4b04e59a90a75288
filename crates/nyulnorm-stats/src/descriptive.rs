/// Descriptive statistics summarizing a set of intensities.
///
/// NaN values are ignored; `count` reports how many values took part.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveStats {
    /// Number of non-NaN values.
    pub count: usize,
    /// The minimum value in the dataset.
    pub min: f64,
    /// The maximum value in the dataset.
    pub max: f64,
    /// The arithmetic mean (average) of the dataset.
    pub mean: f64,
    /// The population standard deviation of the dataset.
    pub std_dev: f64,
}

impl DescriptiveStats {
    /// Computes descriptive statistics in a single pass.
    ///
    /// # Returns
    ///
    /// * `Some(DescriptiveStats)` - if the dataset contains at least one non-NaN value
    /// * `None` - otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// # use nyulnorm_stats::descriptive::DescriptiveStats;
    /// let values = [5.0, 2.0, f32::NAN, 4.0, 1.0, 3.0];
    /// let stats = DescriptiveStats::new(values).unwrap();
    /// assert_eq!(stats.count, 5);
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 5.0);
    /// assert_eq!(stats.mean, 3.0);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f32>,
    {
        let mut count = 0_usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for value in values.into_iter().filter(|v| !v.is_nan()) {
            let value = f64::from(value);
            count += 1;
            min = min.min(value);
            max = max.max(value);
            sum += value;
            sum_sq += value * value;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        let mean = sum / n;
        // rounding can push the difference slightly below zero
        let variance = (sum_sq / n - mean * mean).max(0.0);
        let std_dev = variance.sqrt();
        Some(Self {
            count,
            min,
            max,
            mean,
            std_dev,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_empty_values() {
        assert!(DescriptiveStats::new([]).is_none());
        assert!(DescriptiveStats::new([f32::NAN, f32::NAN]).is_none());
    }

    #[test]
    fn test_std_dev() {
        let stats = DescriptiveStats::new([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_abs_diff_eq!(stats.mean, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.std_dev, 2.0, epsilon = 1e-12);
    }
}
