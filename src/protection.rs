/// Copy protection signal derived from weak-bit analysis
///
/// Weak bits on their own only hint at protection. Callers that also look at
/// long tracks or boot block signatures combine those with the result here.

use crate::image::{DecodedTrack, SectorId};
use crate::weak::{WeakBitReport, WeakPattern};

/// Weak-bit density (per 1000 bits) above which a track is flagged
pub const DENSITY_SIGNAL: f64 = 5.0;

/// Result of copy protection detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionResult {
    /// Name of the detected protection scheme
    pub name: String,
    /// Description of why this protection was detected
    pub reason: String,
}

impl ProtectionResult {
    /// Create a new protection result
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ProtectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.reason)
    }
}

/// Check if a report carries enough weak bits to count as protection
///
/// True when the weak bit count reaches `threshold` or the density exceeds
/// five per thousand bits.
pub fn triggers_protection_signal(report: &WeakBitReport, threshold: u32) -> bool {
    report.weak_bit_count() >= threshold as usize || report.weak_bit_density > DENSITY_SIGNAL
}

/// Detect weak-bit protection from a detection report
///
/// Returns `Some(ProtectionResult)` if the report triggers the protection
/// signal, or `None` if the track looks unprotected.
///
/// # Example
///
/// ```
/// use fluxrecon::protection;
/// use fluxrecon::weak::{detect, WeakBitParams};
///
/// let a = vec![0u8; 64];
/// let b = vec![0xFFu8; 64];
/// let report = detect(&[&a, &b], 64, &WeakBitParams::default())?;
/// if let Some(result) = protection::detect(&report, 10) {
///     println!("Protection: {}", result);
/// }
/// # Ok::<(), fluxrecon::FluxError>(())
/// ```
pub fn detect(report: &WeakBitReport, threshold: u32) -> Option<ProtectionResult> {
    if !triggers_protection_signal(report, threshold) {
        return None;
    }

    let alternating = report
        .records
        .iter()
        .filter(|r| r.pattern == WeakPattern::Alternating)
        .count();

    // Most bits flip on every revolution: a deliberately unstable region
    if alternating * 2 > report.weak_bit_count() {
        return Some(ProtectionResult::new(
            "Fuzzy bits",
            format!(
                "{} of {} weak bits alternate between revolutions",
                alternating,
                report.weak_bit_count()
            ),
        ));
    }

    Some(ProtectionResult::new(
        "Weak bits",
        format!(
            "{} weak bits in {} bytes, {:.2} per 1000 bits",
            report.weak_bit_count(),
            report.weak_bytes.len(),
            report.weak_bit_density
        ),
    ))
}

/// Sectors whose data field holds at least one weak bit
pub fn weak_sectors(track: &DecodedTrack, report: &WeakBitReport) -> Vec<SectorId> {
    track
        .sectors()
        .iter()
        .filter(|s| s.has_data())
        .filter(|s| {
            report
                .records_in(s.data_offset as usize..s.data_end())
                .next()
                .is_some()
        })
        .map(|s| s.id)
        .collect()
}
