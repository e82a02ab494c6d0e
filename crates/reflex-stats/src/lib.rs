//! Pure statistics over the recorded latency sequence.

use reflex_types::session::StatsSnapshot;
use tracing::debug;

/// Best/average/count for `latencies`, or `None` when nothing is recorded yet.
pub fn snapshot(latencies: &[u32], max_attempts: usize) -> Option<StatsSnapshot> {
    let best = *latencies.iter().min()?;
    let last = *latencies.last()?;
    let sum: u64 = latencies.iter().map(|&ms| u64::from(ms)).sum();
    Some(StatsSnapshot {
        best,
        average: rounded_mean(sum as f64, latencies.len(), last),
        count: latencies.len(),
        max_attempts,
    })
}

/// Rounded mean, or `last` when the division does not produce a number.
pub fn rounded_mean(sum: f64, count: usize, last: u32) -> u32 {
    let mean = (sum / count as f64).round();
    if mean.is_finite() && mean >= 0.0 && mean <= u32::MAX as f64 {
        mean as u32
    } else {
        debug!("Average fallback - sum: {sum}, length: {count}, last: {last}");
        last
    }
}

/// Dot-indicator pair: recorded trials out of the session total.
pub fn history(latencies: &[u32], max_attempts: usize) -> (usize, usize) {
    (latencies.len().min(max_attempts), max_attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_sequence_has_no_stats() {
        assert_eq!(snapshot(&[], 5), None);
        assert_eq!(history(&[], 5), (0, 5));
    }

    #[test]
    fn reference_session() {
        let stats = snapshot(&[150, 300, 200, 180, 220], 5).expect("stats");
        assert_eq!(stats.best, 150);
        assert_eq!(stats.average, 210);
        assert_eq!(stats.attempts_label(), "5/5");
    }

    #[test]
    fn average_rounds_half_up() {
        assert_eq!(snapshot(&[200, 201], 5).unwrap().average, 201);
        assert_eq!(snapshot(&[200, 200, 201], 5).unwrap().average, 200);
    }

    #[test]
    fn degenerate_mean_falls_back_to_last() {
        assert_eq!(rounded_mean(f64::NAN, 3, 245), 245);
        assert_eq!(rounded_mean(600.0, 0, 245), 245);
        assert_eq!(rounded_mean(600.0, 3, 245), 200);
    }

    proptest! {
        #[test]
        fn snapshot_matches_sequence(latencies in prop::collection::vec(1u32..5_000, 1..=5)) {
            let stats = snapshot(&latencies, 5).unwrap();
            prop_assert_eq!(stats.best, *latencies.iter().min().unwrap());
            let mean = latencies.iter().map(|&v| v as f64).sum::<f64>() / latencies.len() as f64;
            prop_assert_eq!(stats.average, mean.round() as u32);
            prop_assert_eq!(stats.attempts_label(), format!("{}/5", latencies.len()));
            prop_assert_eq!(history(&latencies, 5), (latencies.len(), 5));
        }
    }
}
