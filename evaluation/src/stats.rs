//! Running tallies and distributional statistics over benchmark trials.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().copied().sum::<f64>() / data.len() as f64
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    (data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

pub fn median(data: &mut [f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = data.len() / 2;
    if data.len() % 2 == 0 {
        (data[mid - 1] + data[mid]) / 2.0
    } else {
        data[mid]
    }
}

/// Classification of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
    /// The model declined to answer (or was gated below the confidence
    /// threshold).
    Refusal,
    /// The reply could not be parsed into an answer at all.
    Invalid,
}

/// Running aggregate over all trials of one benchmark run.
pub struct Tally {
    started: Instant,
    total: usize,
    correct: usize,
    incorrect: usize,
    refusals: usize,
    invalid: usize,
    distribution: BTreeMap<String, usize>,
    confidences: Vec<f64>,
    latencies: Vec<f64>,
    tokens: u64,
}

impl Tally {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total: 0,
            correct: 0,
            incorrect: 0,
            refusals: 0,
            invalid: 0,
            distribution: BTreeMap::new(),
            confidences: Vec::new(),
            latencies: Vec::new(),
            tokens: 0,
        }
    }

    pub fn record(
        &mut self,
        answer_key: &str,
        outcome: Outcome,
        confidence: Option<f64>,
        latency: Duration,
        tokens: u64,
    ) {
        self.total += 1;
        match outcome {
            Outcome::Correct => self.correct += 1,
            Outcome::Incorrect => self.incorrect += 1,
            Outcome::Refusal => self.refusals += 1,
            Outcome::Invalid => self.invalid += 1,
        }

        *self.distribution.entry(answer_key.to_string()).or_insert(0) += 1;

        if let Some(score) = confidence {
            self.confidences.push(score);
        }
        self.latencies.push(latency.as_secs_f64());
        self.tokens += tokens;
    }

    /// Accuracy in percent over ALL trials, refusals included.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.correct as f64 / self.total as f64
    }

    pub fn summary(&self) -> Summary {
        let total_latency: f64 = self.latencies.iter().sum();
        let avg_tokens_per_second = if total_latency > 0.0 {
            self.tokens as f64 / total_latency
        } else {
            0.0
        };
        let mut latencies = self.latencies.clone();

        Summary {
            total: self.total,
            correct: self.correct,
            incorrect: self.incorrect,
            accuracy_pct: self.accuracy(),
            refusals: self.refusals,
            invalid: self.invalid,
            distribution: self.distribution.clone(),
            confidence_mean: mean(&self.confidences),
            confidence_std: std_dev(&self.confidences),
            avg_latency_seconds: mean(&self.latencies),
            median_latency_seconds: median(&mut latencies),
            avg_tokens_per_second,
            wall_time_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Aggregate statistics written into the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub accuracy_pct: f64,
    pub refusals: usize,
    pub invalid: usize,
    pub distribution: BTreeMap<String, usize>,
    pub confidence_mean: f64,
    pub confidence_std: f64,
    pub avg_latency_seconds: f64,
    pub median_latency_seconds: f64,
    pub avg_tokens_per_second: f64,
    pub wall_time_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&data) - 5.0).abs() < 1e-9);
        assert!((std_dev(&data) - 2.0).abs() < 1e-9);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn test_median() {
        let mut odd = [3.0, 1.0, 2.0];
        assert_eq!(median(&mut odd), 2.0);
        let mut even = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut even), 2.5);
        assert_eq!(median(&mut []), 0.0);
    }

    #[test]
    fn test_tally_counters_partition_total() {
        let mut tally = Tally::new();
        tally.record("A", Outcome::Correct, Some(0.9), Duration::from_secs(1), 100);
        tally.record("B", Outcome::Incorrect, Some(0.8), Duration::from_secs(1), 100);
        tally.record("REFUSAL", Outcome::Refusal, Some(0.3), Duration::from_secs(1), 50);
        tally.record("INVALID", Outcome::Invalid, None, Duration::from_secs(1), 50);

        let summary = tally.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(
            summary.correct + summary.incorrect + summary.refusals + summary.invalid,
            summary.total
        );
        assert_eq!(summary.accuracy_pct, 25.0);
        assert_eq!(summary.distribution["A"], 1);
        assert_eq!(summary.distribution["REFUSAL"], 1);
    }

    #[test]
    fn test_confidence_stats_skip_missing() {
        let mut tally = Tally::new();
        tally.record("A", Outcome::Correct, Some(0.8), Duration::from_secs(1), 10);
        tally.record("B", Outcome::Incorrect, None, Duration::from_secs(1), 10);
        tally.record("A", Outcome::Correct, Some(0.6), Duration::from_secs(1), 10);

        let summary = tally.summary();
        assert!((summary.confidence_mean - 0.7).abs() < 1e-9);
        assert!((summary.confidence_std - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_generation_speed() {
        let mut tally = Tally::new();
        tally.record("A", Outcome::Correct, None, Duration::from_secs(2), 100);
        tally.record("B", Outcome::Correct, None, Duration::from_secs(2), 100);
        let summary = tally.summary();
        assert!((summary.avg_tokens_per_second - 50.0).abs() < 1e-9);
        assert!((summary.avg_latency_seconds - 2.0).abs() < 1e-9);
    }
}
