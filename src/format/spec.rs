/// Read configuration and disk type presets

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FluxError, Result};
use crate::flux::PllConfig;
use crate::format::{Encoding, MAX_REVOLUTIONS, MIN_REVOLUTIONS};
use crate::weak::WeakBitParams;

/// Default device sample clock (72 MHz)
pub const DEFAULT_SAMPLE_FREQ_HZ: u32 = 72_000_000;

/// Known disk types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiskType {
    /// Probe the format from the track contents
    #[default]
    Auto,
    /// TRS-80 single sided single density
    Trs80Sssd,
    /// TRS-80 single sided double density
    Trs80Ssdd,
    /// TRS-80 double sided double density
    Trs80Dsdd,
    /// IBM PC double density
    IbmPcDd,
    /// IBM PC high density
    IbmPcHd,
    /// Atari ST double density
    AtariStDd,
    /// Amiga double density
    AmigaDd,
    /// CP/M 8 inch
    Cpm8Inch,
    /// DEC RX02
    DecRx02,
}

impl DiskType {
    /// Every disk type, in menu order
    pub const ALL: [DiskType; 10] = [
        DiskType::Auto,
        DiskType::Trs80Sssd,
        DiskType::Trs80Ssdd,
        DiskType::Trs80Dsdd,
        DiskType::IbmPcDd,
        DiskType::IbmPcHd,
        DiskType::AtariStDd,
        DiskType::AmigaDd,
        DiskType::Cpm8Inch,
        DiskType::DecRx02,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            DiskType::Auto => "Auto-detect",
            DiskType::Trs80Sssd => "TRS-80 SSSD (35T/10S/256B)",
            DiskType::Trs80Ssdd => "TRS-80 SSDD (40T/18S/256B)",
            DiskType::Trs80Dsdd => "TRS-80 DSDD (40T/18S/256B)",
            DiskType::IbmPcDd => "IBM PC DD (40T/9S/512B)",
            DiskType::IbmPcHd => "IBM PC HD (80T/18S/512B)",
            DiskType::AtariStDd => "Atari ST DD (80T/9S/512B)",
            DiskType::AmigaDd => "Amiga DD (80T/11S/512B)",
            DiskType::Cpm8Inch => "CP/M 8-inch",
            DiskType::DecRx02 => "DEC RX02",
        }
    }

    /// Short identifier used on the command line
    pub fn key(&self) -> &'static str {
        match self {
            DiskType::Auto => "auto",
            DiskType::Trs80Sssd => "trs80-sssd",
            DiskType::Trs80Ssdd => "trs80-ssdd",
            DiskType::Trs80Dsdd => "trs80-dsdd",
            DiskType::IbmPcDd => "ibm-dd",
            DiskType::IbmPcHd => "ibm-hd",
            DiskType::AtariStDd => "atari-st",
            DiskType::AmigaDd => "amiga",
            DiskType::Cpm8Inch => "cpm-8",
            DiskType::DecRx02 => "rx02",
        }
    }

    /// Look a disk type up by its short identifier
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.key().eq_ignore_ascii_case(key))
    }
}

impl std::fmt::Display for DiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Settings for reading and reconciling a disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    /// Disk type the settings were derived from
    pub disk_type: DiskType,
    /// Requested encoding
    pub encoding: Encoding,
    /// Capture device sample clock in Hz
    pub sample_freq_hz: u32,
    /// Revolutions merged for every track
    pub revolutions: u8,
    /// Extra revolutions that may be consumed while sectors stay bad
    pub retries: u8,
    /// Cylinders per side
    pub tracks: u8,
    /// Number of heads
    pub heads: u8,
    /// Nominal rotation speed
    pub rpm: u16,
    /// Nominal data rate in kbit/s
    pub data_rate_kbps: u16,
    /// Sectors expected on every track, when known
    pub sectors_per_track: Option<u8>,
    /// PLL constants
    pub pll: PllConfig,
    /// Weak-bit detection parameters
    pub weak: WeakBitParams,
    /// Weak bit count at which a track is counted as protected
    pub protection_threshold: u32,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            disk_type: DiskType::Auto,
            encoding: Encoding::Auto,
            sample_freq_hz: DEFAULT_SAMPLE_FREQ_HZ,
            revolutions: 3,
            retries: 3,
            tracks: 40,
            heads: 1,
            rpm: 300,
            data_rate_kbps: 250,
            sectors_per_track: None,
            pll: PllConfig::default(),
            weak: WeakBitParams::default(),
            protection_threshold: 10,
        }
    }
}

impl ReadConfig {
    fn drive(
        disk_type: DiskType,
        encoding: Encoding,
        tracks: u8,
        heads: u8,
        rpm: u16,
        data_rate_kbps: u16,
        sectors_per_track: Option<u8>,
    ) -> Self {
        Self {
            disk_type,
            encoding,
            tracks,
            heads,
            rpm,
            data_rate_kbps,
            sectors_per_track,
            // Two cells per data bit; MFM gaps run up to four cells
            pll: PllConfig {
                cell_rate_hz: Some(data_rate_kbps as u32 * 2000),
                max_cells: 4,
                ..PllConfig::default()
            },
            ..Self::default()
        }
    }

    /// TRS-80 single sided single density
    pub fn trs80_sssd() -> Self {
        Self::drive(DiskType::Trs80Sssd, Encoding::FM, 35, 1, 300, 125, Some(10))
    }

    /// TRS-80 single sided double density
    pub fn trs80_ssdd() -> Self {
        Self::drive(DiskType::Trs80Ssdd, Encoding::MFM, 40, 1, 300, 250, Some(18))
    }

    /// TRS-80 double sided double density
    pub fn trs80_dsdd() -> Self {
        Self::drive(DiskType::Trs80Dsdd, Encoding::MFM, 40, 2, 300, 250, Some(18))
    }

    /// IBM PC double density
    pub fn ibm_pc_dd() -> Self {
        Self::drive(DiskType::IbmPcDd, Encoding::MFM, 40, 2, 300, 250, Some(9))
    }

    /// IBM PC high density
    pub fn ibm_pc_hd() -> Self {
        Self::drive(DiskType::IbmPcHd, Encoding::MFM, 80, 2, 360, 500, Some(18))
    }

    /// Atari ST double density
    pub fn atari_st_dd() -> Self {
        Self::drive(DiskType::AtariStDd, Encoding::MFM, 80, 2, 300, 250, Some(9))
    }

    /// Amiga double density
    ///
    /// Amiga tracks carry no IBM style ID fields, so no sector count is
    /// expected from the framer.
    pub fn amiga_dd() -> Self {
        Self::drive(DiskType::AmigaDd, Encoding::MFM, 80, 2, 300, 250, None)
    }

    /// CP/M 8 inch
    pub fn cpm_8inch() -> Self {
        Self::drive(DiskType::Cpm8Inch, Encoding::MFM, 77, 1, 360, 500, None)
    }

    /// DEC RX02
    pub fn dec_rx02() -> Self {
        Self::drive(DiskType::DecRx02, Encoding::RX02, 77, 1, 360, 250, None)
    }

    /// Settings for a disk type
    pub fn preset(disk_type: DiskType) -> Self {
        match disk_type {
            DiskType::Auto => Self::default(),
            DiskType::Trs80Sssd => Self::trs80_sssd(),
            DiskType::Trs80Ssdd => Self::trs80_ssdd(),
            DiskType::Trs80Dsdd => Self::trs80_dsdd(),
            DiskType::IbmPcDd => Self::ibm_pc_dd(),
            DiskType::IbmPcHd => Self::ibm_pc_hd(),
            DiskType::AtariStDd => Self::atari_st_dd(),
            DiskType::AmigaDd => Self::amiga_dd(),
            DiskType::Cpm8Inch => Self::cpm_8inch(),
            DiskType::DecRx02 => Self::dec_rx02(),
        }
    }

    /// Set the number of revolutions to merge
    pub fn with_revolutions(mut self, revolutions: u8) -> Self {
        self.revolutions = revolutions;
        self
    }

    /// Set the capture device sample clock
    pub fn with_sample_freq(mut self, sample_freq_hz: u32) -> Self {
        self.sample_freq_hz = sample_freq_hz;
        self
    }

    /// Set the requested encoding
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Weak-bit parameters with this configuration's protection threshold
    pub fn weak_params(&self) -> WeakBitParams {
        WeakBitParams {
            protection_threshold: self.protection_threshold,
            ..self.weak
        }
    }

    /// Nominal track length in bytes at the configured rate and speed
    pub fn nominal_track_bytes(&self) -> usize {
        if self.rpm == 0 {
            return 0;
        }
        let bits_per_rev = self.data_rate_kbps as usize * 1000 * 60 / self.rpm as usize;
        bits_per_rev / 8
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        if self.sample_freq_hz == 0 {
            return Err(FluxError::config("sample frequency must be non-zero"));
        }
        let revolutions = self.revolutions as usize;
        if !(MIN_REVOLUTIONS..=MAX_REVOLUTIONS).contains(&revolutions) {
            return Err(FluxError::config(format!(
                "revolutions {} outside {}..={}",
                self.revolutions, MIN_REVOLUTIONS, MAX_REVOLUTIONS
            )));
        }
        if self.heads == 0 || self.heads > 2 {
            return Err(FluxError::config(format!("heads {} outside 1..=2", self.heads)));
        }
        if self.tracks == 0 {
            return Err(FluxError::config("track count must be non-zero"));
        }
        self.pll.validate()?;
        self.weak.validate()?;
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ReadConfig =
            serde_json::from_str(json).map_err(|e| FluxError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReadConfig::default();
        assert_eq!(config.sample_freq_hz, 72_000_000);
        assert_eq!(config.revolutions, 3);
        assert_eq!(config.encoding, Encoding::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let sssd = ReadConfig::trs80_sssd();
        assert_eq!(sssd.encoding, Encoding::FM);
        assert_eq!(sssd.tracks, 35);
        assert_eq!(sssd.pll.cell_rate_hz, Some(250_000));

        let hd = ReadConfig::ibm_pc_hd();
        assert_eq!((hd.tracks, hd.heads, hd.rpm), (80, 2, 360));
        assert_eq!(hd.pll.cell_rate_hz, Some(1_000_000));
        assert_eq!(hd.sectors_per_track, Some(18));

        assert_eq!(ReadConfig::dec_rx02().encoding, Encoding::RX02);

        for disk_type in DiskType::ALL {
            let config = ReadConfig::preset(disk_type);
            assert_eq!(config.disk_type, disk_type);
            assert!(config.validate().is_ok(), "{} preset invalid", disk_type);
        }
    }

    #[test]
    fn test_disk_type_keys() {
        assert_eq!(DiskType::from_key("IBM-HD"), Some(DiskType::IbmPcHd));
        assert_eq!(DiskType::from_key("nope"), None);
        assert_eq!(DiskType::Trs80Sssd.to_string(), "TRS-80 SSSD (35T/10S/256B)");
    }

    #[test]
    fn test_nominal_track_bytes() {
        // 250 kbit/s at 300 rpm: 50000 bits per revolution
        assert_eq!(ReadConfig::ibm_pc_dd().nominal_track_bytes(), 6250);
        // 500 kbit/s at 360 rpm
        assert_eq!(ReadConfig::ibm_pc_hd().nominal_track_bytes(), 10416);
    }

    #[test]
    fn test_json_round_trip_and_partial() {
        let config = ReadConfig::atari_st_dd().with_revolutions(5);
        let json = config.to_json().unwrap();
        assert_eq!(ReadConfig::from_json(&json).unwrap(), config);

        let partial = ReadConfig::from_json(r#"{ "encoding": "FM", "revolutions": 4 }"#).unwrap();
        assert_eq!(partial.encoding, Encoding::FM);
        assert_eq!(partial.revolutions, 4);
        assert_eq!(partial.sample_freq_hz, DEFAULT_SAMPLE_FREQ_HZ);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            ReadConfig::from_json("{ not json"),
            Err(FluxError::Config(_))
        ));
        assert!(ReadConfig::default().with_revolutions(1).validate().is_err());
        assert!(ReadConfig::default().with_revolutions(11).validate().is_err());
        assert!(ReadConfig::default().with_sample_freq(0).validate().is_err());

        let mut bad_pll = ReadConfig::default();
        bad_pll.pll.phase_gain = 2.0;
        assert!(matches!(bad_pll.validate(), Err(FluxError::InvalidParams(_))));
    }
}
