/// Weak-bit report types and exports

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;

/// Number of records carried by the legacy JSON export
pub const LEGACY_EXPORT_LIMIT: usize = 5;

/// Shape of the values a weak bit took across revolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeakPattern {
    /// Pattern analysis was disabled
    #[default]
    None,
    /// Every revolution read the opposite value of the one before
    Alternating,
    /// Any other mix of values
    Custom,
}

impl WeakPattern {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            WeakPattern::None => "None",
            WeakPattern::Alternating => "Alternating",
            WeakPattern::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for WeakPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Classify a sample sequence
///
/// `Alternating` when every consecutive pair differs, otherwise `Custom`.
pub fn classify_pattern(samples: &[u8]) -> WeakPattern {
    if samples.len() >= 2 && samples.windows(2).all(|w| w[0] != w[1]) {
        WeakPattern::Alternating
    } else {
        WeakPattern::Custom
    }
}

/// One bit that did not read back the same on every revolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakBitRecord {
    /// Byte offset into the track
    pub offset: u32,
    /// Bit within the byte, 0 being the least significant
    pub bit_position: u8,
    /// `distinct * 100 / revolutions`
    pub variation_percent: u8,
    /// Number of distinct values seen
    pub sample_count: u8,
    /// Bit value read on each revolution, in capture order
    pub samples: Vec<u8>,
    /// Pattern classification
    pub pattern: WeakPattern,
}

/// Outcome of one weak-bit detection call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeakBitReport {
    /// Weak bits in (offset, bit) order
    pub records: Vec<WeakBitRecord>,
    /// Offsets of bytes holding at least one weak bit, when byte level analysis is on
    pub weak_bytes: Vec<u32>,
    /// Bytes compared
    pub bytes_analyzed: usize,
    /// Bits compared
    pub bits_analyzed: usize,
    /// Revolutions compared
    pub revolutions_used: usize,
    /// Weak bits per thousand bits analysed
    pub weak_bit_density: f64,
}

impl WeakBitReport {
    /// Number of weak bits found
    pub fn weak_bit_count(&self) -> usize {
        self.records.len()
    }

    /// Check if no weak bit was found
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records that fall inside a byte range
    pub fn records_in(&self, range: std::ops::Range<usize>) -> impl Iterator<Item = &WeakBitRecord> {
        self.records
            .iter()
            .filter(move |r| range.contains(&(r.offset as usize)))
    }

    /// Fixed schema export, limited to the first five records
    pub fn to_legacy_json(&self) -> Result<String> {
        let weak_bits: Vec<_> = self
            .records
            .iter()
            .take(LEGACY_EXPORT_LIMIT)
            .map(|r| {
                json!({
                    "offset": r.offset,
                    "bit": r.bit_position,
                    "variation": r.variation_percent,
                    "samples": r.sample_count,
                })
            })
            .collect();
        let doc = json!({
            "weak_bits_found": self.weak_bit_count(),
            "bytes_analyzed": self.bytes_analyzed,
            "bits_analyzed": self.bits_analyzed,
            "density_per_1000": self.weak_bit_density,
            "weak_bytes": self.weak_bytes.len(),
            "weak_bits": weak_bits,
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Verdict for verify style callers: (is error, message)
    pub fn verify_verdict(&self) -> (bool, String) {
        if self.is_empty() {
            (false, "no weak bits detected".to_string())
        } else {
            (
                true,
                format!(
                    "{} weak bits detected in {} bytes ({:.2} per 1000 bits)",
                    self.weak_bit_count(),
                    self.bytes_analyzed,
                    self.weak_bit_density
                ),
            )
        }
    }
}

/// Weak bits per thousand bits analysed
pub fn density_per_1000(weak_bit_count: usize, bits_analyzed: usize) -> f64 {
    if bits_analyzed == 0 {
        return 0.0;
    }
    weak_bit_count as f64 * 1000.0 / bits_analyzed as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: u32) -> WeakBitRecord {
        WeakBitRecord {
            offset,
            bit_position: 3,
            variation_percent: 40,
            sample_count: 2,
            samples: vec![0, 1, 0, 1, 0],
            pattern: WeakPattern::Alternating,
        }
    }

    #[test]
    fn test_classify_pattern() {
        assert_eq!(classify_pattern(&[0, 1, 0, 1, 0]), WeakPattern::Alternating);
        assert_eq!(classify_pattern(&[0, 0, 1, 1, 0]), WeakPattern::Custom);
        assert_eq!(classify_pattern(&[1, 0]), WeakPattern::Alternating);
    }

    #[test]
    fn test_density() {
        assert_eq!(density_per_1000(10, 2000), 5.0);
        assert_eq!(density_per_1000(0, 2000), 0.0);
        assert_eq!(density_per_1000(3, 0), 0.0);
    }

    #[test]
    fn test_legacy_json_limited() {
        let report = WeakBitReport {
            records: (0..8).map(record).collect(),
            weak_bytes: (0..8).collect(),
            bytes_analyzed: 512,
            bits_analyzed: 4096,
            revolutions_used: 5,
            weak_bit_density: density_per_1000(8, 4096),
        };
        let json = report.to_legacy_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["weak_bits_found"], 8);
        assert_eq!(value["bits_analyzed"], 4096);
        assert_eq!(value["weak_bytes"], 8);
        let bits = value["weak_bits"].as_array().unwrap();
        assert_eq!(bits.len(), LEGACY_EXPORT_LIMIT);
        assert_eq!(bits[4]["offset"], 4);
        assert_eq!(bits[0]["bit"], 3);
        assert_eq!(bits[0]["variation"], 40);
    }

    #[test]
    fn test_verify_verdict() {
        let (error, message) = WeakBitReport::default().verify_verdict();
        assert!(!error);
        assert_eq!(message, "no weak bits detected");

        let report = WeakBitReport {
            records: vec![record(10)],
            bytes_analyzed: 100,
            bits_analyzed: 800,
            weak_bit_density: 1.25,
            ..Default::default()
        };
        let (error, message) = report.verify_verdict();
        assert!(error);
        assert!(message.starts_with("1 weak bits detected"));
    }

    #[test]
    fn test_report_serde() {
        let report = WeakBitReport {
            records: vec![record(1)],
            ..Default::default()
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: WeakBitReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
