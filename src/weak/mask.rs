/// Per-bit weak mask over a track's raw bytes

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FluxError, Result};
use crate::format::MIN_REVOLUTIONS;
use crate::weak::report::WeakBitReport;

/// Bit mask parallel to a raw track buffer; a set bit marks a weak bit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakBitMask {
    bits: Vec<u8>,
}

impl WeakBitMask {
    /// Create an empty mask covering `length` bytes
    pub fn new(length: usize) -> Self {
        Self {
            bits: vec![0; length],
        }
    }

    /// Build a mask by majority deviation
    ///
    /// A bit is weak when the minority value was read on at least
    /// `threshold` (0.0 to 1.0) of the revolutions. Only the common length
    /// of all revolutions is covered.
    pub fn from_revolutions(revolutions: &[&[u8]], threshold: f64) -> Result<Self> {
        if revolutions.len() < MIN_REVOLUTIONS {
            return Err(FluxError::NotEnoughRevolutions {
                found: revolutions.len(),
                required: MIN_REVOLUTIONS,
            });
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(FluxError::invalid_params(format!(
                "mask threshold {} outside 0.0..=1.0",
                threshold
            )));
        }

        let length = revolutions.iter().map(|r| r.len()).min().unwrap_or(0);
        let count = revolutions.len() as f64;
        let mut mask = Self::new(length);
        for (offset, byte) in mask.bits.iter_mut().enumerate() {
            for bit in 0..8 {
                let ones = revolutions
                    .iter()
                    .filter(|r| r[offset] & (1 << bit) != 0)
                    .count();
                let minority = ones.min(revolutions.len() - ones);
                if minority > 0 && minority as f64 / count >= threshold {
                    *byte |= 1 << bit;
                }
            }
        }
        Ok(mask)
    }

    /// Build a mask from the bits listed in a detection report
    pub fn from_report(report: &WeakBitReport) -> Self {
        let mut mask = Self::new(report.bytes_analyzed);
        for record in &report.records {
            mask.set(record.offset as usize, record.bit_position);
        }
        mask
    }

    /// Number of bytes covered
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Check if the mask covers no bytes
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Mask bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Mark a bit as weak; offsets past the end are ignored
    pub fn set(&mut self, offset: usize, bit: u8) {
        if let Some(byte) = self.bits.get_mut(offset) {
            *byte |= 1 << (bit & 7);
        }
    }

    /// Check if a bit is weak
    pub fn is_weak(&self, offset: usize, bit: u8) -> bool {
        self.bits
            .get(offset)
            .is_some_and(|byte| byte & (1 << (bit & 7)) != 0)
    }

    /// Number of weak bits
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// OR another mask into this one, growing to the longer length
    pub fn union(&mut self, other: &WeakBitMask) {
        if other.bits.len() > self.bits.len() {
            self.bits.resize(other.bits.len(), 0);
        }
        for (dst, src) in self.bits.iter_mut().zip(&other.bits) {
            *dst |= src;
        }
    }

    /// Replace every weak bit in `data` with a random value
    pub fn randomize<R: Rng + ?Sized>(&self, data: &mut [u8], rng: &mut R) {
        for (byte, &mask) in data.iter_mut().zip(&self.bits) {
            if mask != 0 {
                *byte = (*byte & !mask) | (rng.gen::<u8>() & mask);
            }
        }
    }
}
