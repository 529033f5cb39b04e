/// Session statistics accumulated across detection calls

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::protection::triggers_protection_signal;
use crate::weak::detector::{detect, WeakBitParams};
use crate::weak::report::WeakBitReport;

/// Running totals over every track analysed in a session
///
/// Owned by the caller and updated once per successful detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Tracks passed through the detector
    pub tracks_analyzed: u32,
    /// Weak bits found over all tracks
    pub weak_bits_found: u64,
    /// Tracks whose report triggered the protection signal
    pub protections_detected: u32,
    /// Mean weak-bit density per track
    pub avg_density: f64,
    /// Time spent inside the detector
    pub total_time: Duration,
}

impl SessionStats {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one report into the totals
    pub fn record(&mut self, report: &WeakBitReport, protection_threshold: u32, elapsed: Duration) {
        self.tracks_analyzed += 1;
        self.weak_bits_found += report.weak_bit_count() as u64;
        if triggers_protection_signal(report, protection_threshold) {
            self.protections_detected += 1;
        }
        let n = self.tracks_analyzed as f64;
        self.avg_density += (report.weak_bit_density - self.avg_density) / n;
        self.total_time += elapsed;
    }

    /// Add another session's totals to this one
    pub fn combine(&mut self, other: &SessionStats) {
        let total = self.tracks_analyzed + other.tracks_analyzed;
        if total > 0 {
            self.avg_density = (self.avg_density * self.tracks_analyzed as f64
                + other.avg_density * other.tracks_analyzed as f64)
                / total as f64;
        }
        self.tracks_analyzed = total;
        self.weak_bits_found += other.weak_bits_found;
        self.protections_detected += other.protections_detected;
        self.total_time += other.total_time;
    }

    /// Reset every counter
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Run [`detect`] and fold the result into `stats`
///
/// On error the accumulator is left untouched.
pub fn detect_with_stats(
    revolutions: &[&[u8]],
    length: usize,
    params: &WeakBitParams,
    stats: &mut SessionStats,
) -> Result<WeakBitReport> {
    let start = Instant::now();
    let report = detect(revolutions, length, params)?;
    stats.record(&report, params.protection_threshold, start.elapsed());
    debug!(
        target: "fluxrecon::weak",
        tracks = stats.tracks_analyzed,
        weak_bits = stats.weak_bits_found,
        protections = stats.protections_detected,
        "session_updated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate() {
        let clean = vec![0u8; 100];
        let mut noisy = clean.clone();
        for byte in noisy.iter_mut().take(12) {
            *byte = 0x01;
        }
        let params = WeakBitParams::default().with_revolutions(2).with_threshold(50);
        let mut stats = SessionStats::new();

        detect_with_stats(&[&clean, &clean], 100, &params, &mut stats).unwrap();
        detect_with_stats(&[&clean, &noisy], 100, &params, &mut stats).unwrap();

        assert_eq!(stats.tracks_analyzed, 2);
        assert_eq!(stats.weak_bits_found, 12);
        assert_eq!(stats.protections_detected, 1);
        // (0 + 12 * 1000 / 800) / 2
        assert!((stats.avg_density - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_error_leaves_stats_untouched() {
        let data = vec![0u8; 10];
        let mut stats = SessionStats::new();
        let result = detect_with_stats(&[&data], 10, &WeakBitParams::default(), &mut stats);
        assert!(result.is_err());
        assert_eq!(stats, SessionStats::default());
    }

    #[test]
    fn test_combine_and_reset() {
        let mut a = SessionStats {
            tracks_analyzed: 1,
            weak_bits_found: 4,
            avg_density: 2.0,
            ..Default::default()
        };
        let b = SessionStats {
            tracks_analyzed: 3,
            weak_bits_found: 0,
            protections_detected: 1,
            avg_density: 6.0,
            ..Default::default()
        };
        a.combine(&b);
        assert_eq!(a.tracks_analyzed, 4);
        assert_eq!(a.weak_bits_found, 4);
        assert_eq!(a.protections_detected, 1);
        assert!((a.avg_density - 5.0).abs() < 1e-9);

        a.reset();
        assert_eq!(a, SessionStats::default());
    }
}
