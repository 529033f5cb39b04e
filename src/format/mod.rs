/// Encodings, address marks and read configuration

/// Mark patterns, sizes and limits
pub mod constants;
/// Read configuration and disk type presets
pub mod spec;

pub use constants::*;
pub use spec::{DiskType, ReadConfig};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Track encoding requested from, or detected by, the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// Let the framer look for both FM and MFM marks
    Auto,
    /// FM (Frequency Modulation) - single density
    FM,
    /// MFM (Modified Frequency Modulation) - double density
    MFM,
    /// FM and MFM fields mixed on the same track
    Mixed,
    /// DEC RX02: FM headers with a double density data mark
    RX02,
}

impl Encoding {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Auto => "Auto",
            Encoding::FM => "FM (Single Density)",
            Encoding::MFM => "MFM (Double Density)",
            Encoding::Mixed => "Mixed (FM+MFM)",
            Encoding::RX02 => "RX02 (DEC)",
        }
    }

    /// Nominal bit-cell rate used to derive the PLL's base period
    pub fn cell_rate_hz(&self) -> u32 {
        match self {
            Encoding::FM | Encoding::RX02 => FM_CELL_RATE_HZ,
            Encoding::MFM | Encoding::Auto | Encoding::Mixed => MFM_CELL_RATE_HZ,
        }
    }

    /// Whether the framer should look for MFM A1 sync words
    pub fn scans_mfm(&self) -> bool {
        matches!(self, Encoding::MFM | Encoding::Auto | Encoding::Mixed)
    }

    /// Whether the framer should look for FM clock-violating marks
    pub fn scans_fm(&self) -> bool {
        matches!(
            self,
            Encoding::FM | Encoding::RX02 | Encoding::Auto | Encoding::Mixed
        )
    }

    /// Whether fields in this encoding are double density
    pub fn is_double_density(&self) -> bool {
        *self == Encoding::MFM
    }
}

impl From<u8> for Encoding {
    fn from(value: u8) -> Self {
        match value {
            1 => Encoding::FM,
            2 => Encoding::MFM,
            3 => Encoding::Mixed,
            4 => Encoding::RX02,
            _ => Encoding::Auto,
        }
    }
}

impl From<Encoding> for u8 {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Auto => 0,
            Encoding::FM => 1,
            Encoding::MFM => 2,
            Encoding::Mixed => 3,
            Encoding::RX02 => 4,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Data address mark type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamType {
    /// Normal data (FB)
    Normal,
    /// Deleted data (F8)
    Deleted,
    /// TRSDOS directory data (FA)
    TrsdosDirectory,
    /// TRSDOS system data (F9)
    TrsdosSystem,
    /// RX02 double density data (FD)
    Rx02,
}

impl DamType {
    /// Classify a mark byte following a sync run
    pub fn from_mark(mark: u8) -> Option<Self> {
        match mark {
            0xFB => Some(DamType::Normal),
            0xF8 => Some(DamType::Deleted),
            0xFA => Some(DamType::TrsdosDirectory),
            0xF9 => Some(DamType::TrsdosSystem),
            0xFD => Some(DamType::Rx02),
            _ => None,
        }
    }

    /// The mark byte for this type
    pub fn mark(&self) -> u8 {
        match self {
            DamType::Normal => 0xFB,
            DamType::Deleted => 0xF8,
            DamType::TrsdosDirectory => 0xFA,
            DamType::TrsdosSystem => 0xF9,
            DamType::Rx02 => 0xFD,
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            DamType::Normal => "Normal",
            DamType::Deleted => "Deleted",
            DamType::TrsdosDirectory => "TRSDOS Directory",
            DamType::TrsdosSystem => "TRSDOS System",
            DamType::Rx02 => "RX02",
        }
    }
}

impl fmt::Display for DamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_conversion() {
        assert_eq!(Encoding::from(1), Encoding::FM);
        assert_eq!(Encoding::from(2), Encoding::MFM);
        assert_eq!(Encoding::from(99), Encoding::Auto);
        assert_eq!(u8::from(Encoding::RX02), 4);
    }

    #[test]
    fn test_cell_rates() {
        assert_eq!(Encoding::FM.cell_rate_hz(), 125_000);
        assert_eq!(Encoding::MFM.cell_rate_hz(), 250_000);
        assert_eq!(Encoding::Auto.cell_rate_hz(), 250_000);
    }

    #[test]
    fn test_scan_sets() {
        assert!(Encoding::MFM.scans_mfm());
        assert!(!Encoding::MFM.scans_fm());
        assert!(Encoding::FM.scans_fm());
        assert!(!Encoding::FM.scans_mfm());
        assert!(Encoding::Mixed.scans_fm() && Encoding::Mixed.scans_mfm());
    }

    #[test]
    fn test_dam_types() {
        assert_eq!(DamType::from_mark(0xFB), Some(DamType::Normal));
        assert_eq!(DamType::from_mark(0xF8), Some(DamType::Deleted));
        assert_eq!(DamType::from_mark(0xFE), None);
        assert_eq!(DamType::TrsdosSystem.mark(), 0xF9);
        assert_eq!(DamType::TrsdosDirectory.to_string(), "TRSDOS Directory");
    }
}
