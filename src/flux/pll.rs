/// Software phase-locked loop turning flux intervals into bit cells
///
/// The loop keeps a phase offset and a cell period estimate. Every interval
/// is quantised to a whole number of cells, the cells are emitted as
/// `cells - 1` zeros followed by a one, and the residual timing error nudges
/// both estimates. The period is clamped to a band around the nominal value
/// so a burst of noise cannot drag the loop off frequency.
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FluxError, Result};
use crate::flux::bits::BitCellStream;
use crate::flux::stream::FluxReader;
use crate::format::{Encoding, MAX_TRACK_LEN};

/// Upper bound on the cells produced by a single decode
///
/// Enough cells to fill a maximum length track at 16 cells per byte.
pub const MAX_BIT_CELLS: usize = MAX_TRACK_LEN * 16;

/// Tunable loop constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PllConfig {
    /// Fraction of the timing error carried into the next phase
    pub phase_gain: f64,
    /// Fraction of the per-cell timing error applied to the period
    pub freq_gain: f64,
    /// Allowed period deviation from nominal, as a fraction
    pub drift_limit: f64,
    /// Largest cell count a single interval may represent
    pub max_cells: u32,
    /// Override for the encoding's nominal cell rate
    pub cell_rate_hz: Option<u32>,
}

impl Default for PllConfig {
    fn default() -> Self {
        Self {
            phase_gain: 0.1,
            freq_gain: 0.01,
            drift_limit: 0.10,
            max_cells: 3,
            cell_rate_hz: None,
        }
    }
}

impl PllConfig {
    /// Reject gains that would make the loop diverge or stall
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.phase_gain) {
            return Err(FluxError::invalid_params(format!(
                "phase gain {} outside 0..=1",
                self.phase_gain
            )));
        }
        if !(0.0..=1.0).contains(&self.freq_gain) {
            return Err(FluxError::invalid_params(format!(
                "frequency gain {} outside 0..=1",
                self.freq_gain
            )));
        }
        if !(0.0..1.0).contains(&self.drift_limit) {
            return Err(FluxError::invalid_params(format!(
                "drift limit {} outside 0..1",
                self.drift_limit
            )));
        }
        if self.max_cells == 0 {
            return Err(FluxError::invalid_params("max cells must be at least 1"));
        }
        if self.cell_rate_hz == Some(0) {
            return Err(FluxError::invalid_params("cell rate must be non-zero"));
        }
        Ok(())
    }

    /// This config, or the defaults when it fails validation
    pub fn or_default(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                warn!(
                    target: "fluxrecon::pll",
                    error = %e,
                    "invalid loop constants, using defaults"
                );
                PllConfig::default()
            }
        }
    }

    /// Nominal cell period in sample ticks for an encoding
    pub fn nominal_period(&self, sample_freq_hz: u32, encoding: Encoding) -> f64 {
        let rate = self.cell_rate_hz.unwrap_or_else(|| encoding.cell_rate_hz());
        if rate == 0 {
            return 0.0;
        }
        sample_freq_hz as f64 / rate as f64
    }
}

/// Loop state
#[derive(Debug, Clone)]
pub struct Pll {
    nominal: f64,
    phase: f64,
    freq: f64,
    config: PllConfig,
}

impl Pll {
    /// Create a loop locked to a nominal cell period (in sample ticks)
    ///
    /// Constants that fail [`PllConfig::validate`] are replaced by the
    /// defaults.
    pub fn new(nominal_period: f64, config: PllConfig) -> Self {
        Self {
            nominal: nominal_period,
            phase: 0.0,
            freq: nominal_period,
            config: config.or_default(),
        }
    }

    /// Create a loop for a device sample clock and encoding
    pub fn for_encoding(sample_freq_hz: u32, encoding: Encoding, config: PllConfig) -> Self {
        let config = config.or_default();
        Self::new(config.nominal_period(sample_freq_hz, encoding), config)
    }

    /// Nominal cell period
    pub fn nominal_period(&self) -> f64 {
        self.nominal
    }

    /// Current cell period estimate
    pub fn freq(&self) -> f64 {
        self.freq
    }

    /// Current phase offset
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Smallest period the loop may settle on
    pub fn min_period(&self) -> f64 {
        self.nominal * (1.0 - self.config.drift_limit)
    }

    /// Largest period the loop may settle on
    pub fn max_period(&self) -> f64 {
        self.nominal * (1.0 + self.config.drift_limit)
    }

    /// Reset phase and period to their initial values
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.freq = self.nominal;
    }

    /// Feed one interval, returning the number of cells it spans
    pub fn step(&mut self, interval: u32) -> u32 {
        let sample = interval as f64;
        let max_cells = self.config.max_cells.max(1);

        let estimate = ((sample - self.phase) / self.freq).round();
        let cells = if estimate.is_finite() {
            estimate.clamp(1.0, max_cells as f64) as u32
        } else {
            1
        };

        let error = sample - (self.phase + cells as f64 * self.freq);
        self.phase = error * self.config.phase_gain;
        self.freq += error * self.config.freq_gain / cells as f64;
        // Band is inverted for a negative nominal period, so no clamp
        self.freq = self.freq.max(self.min_period()).min(self.max_period());

        cells
    }
}

/// Decode a raw flux buffer with the default loop constants
///
/// Never fails; a capture that cannot be decoded produces an empty or
/// garbled stream and is caught downstream by the CRC checks.
pub fn decode(flux: &[u8], sample_freq_hz: u32, encoding: Encoding) -> BitCellStream {
    decode_with(flux, sample_freq_hz, encoding, &PllConfig::default())
}

/// Decode a raw flux buffer with explicit loop constants
pub fn decode_with(
    flux: &[u8],
    sample_freq_hz: u32,
    encoding: Encoding,
    config: &PllConfig,
) -> BitCellStream {
    let mut pll = Pll::for_encoding(sample_freq_hz, encoding, *config);
    let period = pll.nominal_period();
    if period.is_nan() || period <= 0.0 {
        warn!(
            target: "fluxrecon::pll",
            sample_freq_hz,
            ?encoding,
            "nominal cell period is zero, nothing decoded"
        );
        return BitCellStream::new();
    }

    let bits = decode_intervals(FluxReader::new(flux), &mut pll);
    debug!(
        target: "fluxrecon::pll",
        flux_bytes = flux.len(),
        cells = bits.len(),
        period = pll.freq(),
        "flux_decoded"
    );
    bits
}

/// Run intervals through an existing loop
///
/// Zero-length intervals carry no transition timing and are skipped.
/// Output stops at [`MAX_BIT_CELLS`].
pub fn decode_intervals<I>(intervals: I, pll: &mut Pll) -> BitCellStream
where
    I: IntoIterator<Item = u32>,
{
    let mut bits = BitCellStream::new();
    for interval in intervals {
        if interval == 0 {
            continue;
        }
        if bits.len() >= MAX_BIT_CELLS {
            warn!(
                target: "fluxrecon::pll",
                cells = bits.len(),
                "bit cell limit reached, remaining flux ignored"
            );
            break;
        }
        let cells = pll.step(interval) as usize;
        let zeros = (cells - 1).min(MAX_BIT_CELLS - bits.len());
        bits.push_zeros(zeros);
        if bits.len() < MAX_BIT_CELLS {
            bits.push(true);
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::stream::encode_intervals;
    use proptest::prelude::*;

    // 72 MHz sample clock, MFM: 288 ticks per cell
    const SAMPLE_FREQ: u32 = 72_000_000;
    const T0: u32 = 288;

    #[test]
    fn test_nominal_period() {
        let config = PllConfig::default();
        assert_eq!(config.nominal_period(SAMPLE_FREQ, Encoding::MFM), 288.0);
        assert_eq!(config.nominal_period(SAMPLE_FREQ, Encoding::FM), 576.0);

        let custom = PllConfig {
            cell_rate_hz: Some(500_000),
            ..PllConfig::default()
        };
        assert_eq!(custom.nominal_period(SAMPLE_FREQ, Encoding::MFM), 144.0);
    }

    #[test]
    fn test_stable_signal_no_drift() {
        let n = 1000;
        let flux = encode_intervals(&vec![T0; n]);
        let bits = decode(&flux, SAMPLE_FREQ, Encoding::MFM);

        assert_eq!(bits.len(), n);
        assert_eq!(bits.count_ones(), n);
        assert_eq!(bits.as_bytes().len(), n.div_ceil(8));
    }

    #[test]
    fn test_cell_quantisation() {
        let mut pll = Pll::new(100.0, PllConfig::default());
        assert_eq!(pll.step(100), 1);
        assert_eq!(pll.step(200), 2);
        assert_eq!(pll.step(300), 3);
        // Longer gaps clamp to the configured maximum
        pll.reset();
        assert_eq!(pll.step(1000), 3);
        // A glitch shorter than one cell still counts as one
        pll.reset();
        assert_eq!(pll.step(10), 1);
    }

    #[test]
    fn test_emits_zeros_then_one() {
        let mut pll = Pll::new(100.0, PllConfig::default());
        let bits = decode_intervals([200, 100, 300], &mut pll);
        let cells: Vec<bool> = (0..bits.len()).filter_map(|i| bits.get(i)).collect();
        assert_eq!(cells, vec![false, true, true, false, false, true]);
    }

    #[test]
    fn test_zero_intervals_skipped() {
        let mut pll = Pll::new(100.0, PllConfig::default());
        let bits = decode_intervals([0, 100, 0, 100], &mut pll);
        assert_eq!(bits.len(), 2);
    }

    #[test]
    fn test_zero_sample_clock_decodes_nothing() {
        let bits = decode(&[10, 20, 30], 0, Encoding::MFM);
        assert!(bits.is_empty());
    }

    #[test]
    fn test_frequency_clamped_under_sustained_error() {
        let mut pll = Pll::new(100.0, PllConfig::default());
        for _ in 0..10_000 {
            pll.step(149);
        }
        assert!(pll.freq() <= pll.max_period() + 1e-9);
        assert!(pll.freq() >= pll.min_period() - 1e-9);
    }

    #[test]
    fn test_config_validation() {
        assert!(PllConfig::default().validate().is_ok());
        let bad = PllConfig {
            phase_gain: 1.5,
            ..PllConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = PllConfig {
            max_cells: 0,
            ..PllConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_invalid_constants_fall_back_to_defaults() {
        let clean = encode_intervals(&vec![T0; 200]);
        for bad in [
            PllConfig { drift_limit: -0.1, ..PllConfig::default() },
            PllConfig { drift_limit: f64::NAN, ..PllConfig::default() },
            PllConfig { phase_gain: f64::INFINITY, ..PllConfig::default() },
            PllConfig { cell_rate_hz: Some(0), ..PllConfig::default() },
        ] {
            let bits = decode_with(&clean, SAMPLE_FREQ, Encoding::MFM, &bad);
            assert_eq!(bits.len(), 200);
            assert_eq!(bits.count_ones(), 200);
        }
    }

    #[test]
    fn test_negative_period_does_not_panic() {
        let mut pll = Pll::new(-100.0, PllConfig::default());
        for interval in [1, 100, 1000] {
            assert!((1..=3).contains(&pll.step(interval)));
        }
    }

    proptest! {
        #[test]
        fn prop_frequency_stays_in_band(
            intervals in proptest::collection::vec(274u32..=302, 10_000)
        ) {
            let mut pll = Pll::for_encoding(SAMPLE_FREQ, Encoding::MFM, PllConfig::default());
            let (lo, hi) = (0.9 * T0 as f64, 1.1 * T0 as f64);
            for interval in intervals {
                pll.step(interval);
                prop_assert!(pll.freq() >= lo - 1e-9 && pll.freq() <= hi + 1e-9);
            }
        }
    }
}
