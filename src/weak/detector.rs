/// Weak-bit detection across byte-aligned revolutions

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FluxError, Result};
use crate::format::{MAX_REVOLUTIONS, MIN_REVOLUTIONS};
use crate::weak::report::{
    classify_pattern, density_per_1000, WeakBitRecord, WeakBitReport, WeakPattern,
};

/// Weak-bit detection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeakBitParams {
    /// Maximum number of revolutions to compare
    pub revolution_count: u8,
    /// Minimum variation percentage for a bit to be reported
    pub variation_threshold: u8,
    /// Collect the list of bytes holding weak bits
    pub enable_byte_level: bool,
    /// Classify each weak bit's sample pattern
    pub enable_pattern_analysis: bool,
    /// Weak bit count at which a track is counted as protected
    pub protection_threshold: u32,
}

impl Default for WeakBitParams {
    fn default() -> Self {
        Self {
            revolution_count: 5,
            variation_threshold: 30,
            enable_byte_level: true,
            enable_pattern_analysis: true,
            protection_threshold: 10,
        }
    }
}

impl WeakBitParams {
    /// Set the number of revolutions to compare
    pub fn with_revolutions(mut self, count: u8) -> Self {
        self.revolution_count = count;
        self
    }

    /// Set the variation threshold
    pub fn with_threshold(mut self, percent: u8) -> Self {
        self.variation_threshold = percent;
        self
    }

    /// Check the parameters are usable
    pub fn validate(&self) -> Result<()> {
        if self.revolution_count == 0 {
            return Err(FluxError::invalid_params("revolution_count must be at least 1"));
        }
        if self.revolution_count as usize > MAX_REVOLUTIONS {
            return Err(FluxError::invalid_params(format!(
                "revolution_count {} exceeds {}",
                self.revolution_count, MAX_REVOLUTIONS
            )));
        }
        if self.variation_threshold > 100 {
            return Err(FluxError::invalid_params(format!(
                "variation_threshold {} exceeds 100",
                self.variation_threshold
            )));
        }
        Ok(())
    }
}

/// Compare `length` bytes of several revolutions bit by bit
///
/// Revolutions must share the same start of track; that alignment is the
/// caller's contract. At most `params.revolution_count` revolutions are
/// used, in order. Bit 0 is the least significant bit of a byte.
pub fn detect(revolutions: &[&[u8]], length: usize, params: &WeakBitParams) -> Result<WeakBitReport> {
    params.validate()?;
    if revolutions.len() < MIN_REVOLUTIONS {
        return Err(FluxError::NotEnoughRevolutions {
            found: revolutions.len(),
            required: MIN_REVOLUTIONS,
        });
    }
    let used = revolutions.len().min(params.revolution_count as usize);
    if used < MIN_REVOLUTIONS {
        return Err(FluxError::NotEnoughRevolutions {
            found: used,
            required: MIN_REVOLUTIONS,
        });
    }
    let revolutions = &revolutions[..used];
    let shortest = revolutions.iter().map(|r| r.len()).min().unwrap_or(0);
    if length == 0 || length > shortest {
        return Err(FluxError::InvalidLength {
            length,
            available: shortest,
        });
    }

    let mut records = Vec::new();
    let mut weak_bytes = Vec::new();
    let mut samples = vec![0u8; used];

    for offset in 0..length {
        let mut byte_is_weak = false;
        for bit in 0..8u8 {
            for (sample, rev) in samples.iter_mut().zip(revolutions) {
                *sample = (rev[offset] >> bit) & 1;
            }
            let ones = samples.iter().filter(|&&s| s == 1).count();
            let distinct = if ones == 0 || ones == used { 1 } else { 2 };
            if distinct == 1 {
                continue;
            }

            let variation_percent = (distinct * 100 / used) as u8;
            if variation_percent < params.variation_threshold {
                continue;
            }

            let pattern = if params.enable_pattern_analysis {
                classify_pattern(&samples)
            } else {
                WeakPattern::None
            };
            records.push(WeakBitRecord {
                offset: offset as u32,
                bit_position: bit,
                variation_percent,
                sample_count: distinct as u8,
                samples: samples.clone(),
                pattern,
            });
            byte_is_weak = true;
        }
        if byte_is_weak && params.enable_byte_level {
            weak_bytes.push(offset as u32);
        }
    }

    let bits_analyzed = length * 8;
    let report = WeakBitReport {
        weak_bit_density: density_per_1000(records.len(), bits_analyzed),
        records,
        weak_bytes,
        bytes_analyzed: length,
        bits_analyzed,
        revolutions_used: used,
    };

    debug!(
        target: "fluxrecon::weak",
        revolutions = used,
        bytes = length,
        weak_bits = report.weak_bit_count(),
        density = report.weak_bit_density,
        "weak_bits_detected"
    );
    if !report.is_empty() {
        info!(
            target: "fluxrecon::weak",
            weak_bits = report.weak_bit_count(),
            weak_bytes = report.weak_bytes.len(),
            "weak bits found"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(revolutions: u8, threshold: u8) -> WeakBitParams {
        WeakBitParams::default()
            .with_revolutions(revolutions)
            .with_threshold(threshold)
    }

    #[test]
    fn test_single_flipped_bit() {
        let a = vec![0u8; 32];
        let mut b = a.clone();
        b[10] ^= 1 << 3;

        for threshold in [0, 50, 100] {
            let report = detect(&[&a, &b], 32, &params(2, threshold)).unwrap();
            assert_eq!(report.weak_bit_count(), 1);
            let record = &report.records[0];
            assert_eq!((record.offset, record.bit_position), (10, 3));
            assert_eq!(record.sample_count, 2);
            assert_eq!(record.variation_percent, 100);
            assert_eq!(record.samples, vec![0, 1]);
        }
    }

    #[test]
    fn test_alternating_bit_over_five_revolutions() {
        let revolutions: Vec<Vec<u8>> = (0..5)
            .map(|i| {
                let mut rev = vec![0x4Eu8; 512];
                if i % 2 == 1 {
                    rev[256] ^= 1 << 3;
                }
                rev
            })
            .collect();
        let views: Vec<&[u8]> = revolutions.iter().map(Vec::as_slice).collect();

        let report = detect(&views, 512, &params(5, 30)).unwrap();
        assert_eq!(report.weak_bit_count(), 1);
        assert_eq!(report.records[0].pattern, WeakPattern::Alternating);
        assert_eq!(report.records[0].variation_percent, 40);
        assert_eq!(report.weak_bytes, vec![256]);
        assert_eq!(report.bits_analyzed, 4096);

        // 200 / 5 = 40 falls short of a 50 percent threshold
        let strict = detect(&views, 512, &params(5, 50)).unwrap();
        assert!(strict.is_empty());
    }

    #[test]
    fn test_custom_pattern_and_flags() {
        let bits = [0u8, 0, 1, 1, 0];
        let revolutions: Vec<Vec<u8>> = bits.iter().map(|&b| vec![b; 4]).collect();
        let views: Vec<&[u8]> = revolutions.iter().map(Vec::as_slice).collect();

        let report = detect(&views, 4, &params(5, 0)).unwrap();
        assert_eq!(report.weak_bit_count(), 4);
        assert!(report.records.iter().all(|r| r.pattern == WeakPattern::Custom));

        let plain = WeakBitParams {
            enable_byte_level: false,
            enable_pattern_analysis: false,
            ..params(5, 0)
        };
        let report = detect(&views, 4, &plain).unwrap();
        assert!(report.weak_bytes.is_empty());
        assert!(report.records.iter().all(|r| r.pattern == WeakPattern::None));
    }

    #[test]
    fn test_revolution_count_limits_comparison() {
        let a = vec![0u8; 8];
        let b = vec![0u8; 8];
        let c = vec![0xFFu8; 8];
        let report = detect(&[&a, &b, &c], 8, &params(2, 0)).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.revolutions_used, 2);
    }

    #[test]
    fn test_invalid_inputs() {
        let a = vec![0u8; 8];
        let short = vec![0u8; 4];

        assert!(matches!(
            detect(&[&a], 8, &params(5, 30)),
            Err(FluxError::NotEnoughRevolutions { found: 1, required: 2 })
        ));
        assert!(matches!(
            detect(&[&a, &a], 8, &params(1, 30)),
            Err(FluxError::NotEnoughRevolutions { found: 1, .. })
        ));
        assert!(matches!(
            detect(&[&a, &a], 0, &params(5, 30)),
            Err(FluxError::InvalidLength { length: 0, .. })
        ));
        assert!(matches!(
            detect(&[&a, &short], 8, &params(5, 30)),
            Err(FluxError::InvalidLength { length: 8, available: 4 })
        ));
        assert!(matches!(
            detect(&[&a, &a], 8, &params(0, 30)),
            Err(FluxError::InvalidParams(_))
        ));
        assert!(matches!(
            detect(&[&a, &a], 8, &params(5, 101)),
            Err(FluxError::InvalidParams(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_identical_revolutions_have_no_weak_bits(
            data in proptest::collection::vec(any::<u8>(), 1..256),
            copies in 2usize..=10,
            threshold in 0u8..=100,
        ) {
            let views: Vec<&[u8]> = (0..copies).map(|_| data.as_slice()).collect();
            let report = detect(&views, data.len(), &params(10, threshold)).unwrap();
            prop_assert_eq!(report.weak_bit_count(), 0);
            prop_assert_eq!(report.weak_bit_density, 0.0);
        }
    }
}
