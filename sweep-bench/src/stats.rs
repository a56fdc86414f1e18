use serde::{Deserialize, Serialize};

/// Summary of a batch of timings in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
    pub cv_percent: f64,
    pub sample_count: usize,
    pub outliers_removed: usize,
}

impl Stats {
    /// Summarize `samples` after dropping values outside
    /// `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`. The filter is skipped when it would
    /// leave fewer than two samples.
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);
        if sorted.is_empty() {
            return Self::default();
        }

        let (q1, q3) = (quantile(&sorted, 0.25), quantile(&sorted, 0.75));
        let fence = 1.5 * (q3 - q1);
        let kept: Vec<f64> = sorted
            .iter()
            .copied()
            .filter(|&v| v >= q1 - fence && v <= q3 + fence)
            .collect();
        let data = if kept.len() >= 2 { kept } else { sorted };
        let outliers_removed = samples.len() - data.len();

        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let stddev = if data.len() > 1 {
            (data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Self {
            mean,
            median: quantile(&data, 0.5),
            min: data[0],
            max: data[data.len() - 1],
            stddev,
            cv_percent: if mean > 0.0 { stddev / mean * 100.0 } else { 0.0 },
            sample_count: data.len(),
            outliers_removed,
        }
    }

    /// Throughput of `count` keys at the median time.
    pub fn keys_per_sec(&self, count: usize) -> f64 {
        sweep_primitives::keys_per_second(count, self.median)
    }
}

/// Linear-interpolated quantile `q` in `[0, 1]` of a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_single() {
        assert_eq!(Stats::from_samples(&[]), Stats::default());
        let s = Stats::from_samples(&[42.0]);
        assert_eq!((s.mean, s.median, s.min, s.max), (42.0, 42.0, 42.0, 42.0));
        assert_eq!(s.stddev, 0.0);
        assert_eq!(s.sample_count, 1);
    }

    #[test]
    fn test_basic_stats() {
        let s = Stats::from_samples(&[5.0, 3.0, 1.0, 4.0, 2.0]);
        assert!((s.mean - 3.0).abs() < 1e-10);
        assert!((s.median - 3.0).abs() < 1e-10);
        assert_eq!((s.min, s.max), (1.0, 5.0));
        assert!((s.stddev - 2.5f64.sqrt()).abs() < 1e-10);
        assert!((s.cv_percent - s.stddev / s.mean * 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_even_median() {
        let s = Stats::from_samples(&[1.0, 2.0, 3.0, 4.0]);
        assert!((s.median - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_outliers_removed() {
        let mut samples = vec![100.0, 100.1, 99.9, 100.2, 99.8, 100.0, 100.1, 99.9, 100.0, 100.0];
        samples.push(500.0);
        samples.push(1.0);
        let s = Stats::from_samples(&samples);
        assert_eq!(s.outliers_removed, 2);
        assert!(s.mean > 99.0 && s.mean < 101.0, "mean {}", s.mean);
    }

    #[test]
    fn test_uniform_data_keeps_everything() {
        let samples: Vec<f64> = (1..=10).map(f64::from).collect();
        let s = Stats::from_samples(&samples);
        assert_eq!(s.outliers_removed, 0);
        assert_eq!(s.sample_count, 10);
    }

    #[test]
    fn test_quantiles() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&sorted, 0.0), 1.0);
        assert_eq!(quantile(&sorted, 0.25), 2.0);
        assert_eq!(quantile(&sorted, 0.5), 3.0);
        assert_eq!(quantile(&sorted, 1.0), 5.0);
        assert!((quantile(&sorted, 0.1) - 1.4).abs() < 1e-10);
    }

    #[test]
    fn test_keys_per_sec_uses_median() {
        let s = Stats::from_samples(&[2.0, 2.0, 2.0]);
        assert!((s.keys_per_sec(1_000_000) - 5e8).abs() < 1.0);
    }
}
