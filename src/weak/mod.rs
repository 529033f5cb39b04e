/// Weak-bit detection
///
/// Compares several byte-aligned reads of one track bit by bit and reports
/// every bit whose value was not reproducible.

/// Detector and parameters
pub mod detector;
/// Weak-bit mask
pub mod mask;
/// Report types and exports
pub mod report;
/// Session statistics
pub mod session;

pub use detector::{detect, WeakBitParams};
pub use mask::WeakBitMask;
pub use report::{
    classify_pattern, density_per_1000, WeakBitRecord, WeakBitReport, WeakPattern,
    LEGACY_EXPORT_LIMIT,
};
pub use session::{detect_with_stats, SessionStats};

use crate::image::DecodedTrack;

/// Container that can store weak-bit information alongside its data
pub trait AttachWeakBits {
    /// Store (or merge in) a weak-bit mask
    fn attach_weak_bits(&mut self, mask: WeakBitMask);
}

/// Container that can expose weak-bit information
pub trait ReadWeakBits {
    /// Weak-bit mask, if one is attached
    fn weak_bits(&self) -> Option<&WeakBitMask>;

    /// Check if a single bit is marked weak
    fn is_weak_bit(&self, offset: usize, bit: u8) -> bool {
        self.weak_bits().is_some_and(|m| m.is_weak(offset, bit))
    }

    /// Number of bits marked weak
    fn weak_bit_count(&self) -> usize {
        self.weak_bits().map_or(0, WeakBitMask::count)
    }
}

impl AttachWeakBits for DecodedTrack {
    fn attach_weak_bits(&mut self, mask: WeakBitMask) {
        match self.weak_mask() {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.union(&mask);
                self.set_weak_mask(merged);
            }
            None => self.set_weak_mask(mask),
        }
    }
}

impl ReadWeakBits for DecodedTrack {
    fn weak_bits(&self) -> Option<&WeakBitMask> {
        self.weak_mask()
    }
}

impl AttachWeakBits for WeakBitMask {
    fn attach_weak_bits(&mut self, mask: WeakBitMask) {
        self.union(&mask);
    }
}

impl ReadWeakBits for WeakBitMask {
    fn weak_bits(&self) -> Option<&WeakBitMask> {
        Some(self)
    }
}
