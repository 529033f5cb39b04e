/// On-disk mark patterns, sizes and limits

/// MFM A1 sync word (A1 data with a missing clock bit)
pub const MFM_SYNC_A1: u16 = 0x4489;

/// MFM C2 index sync word (C2 data with a missing clock bit)
pub const MFM_SYNC_C2: u16 = 0x5224;

/// Data byte carried by an MFM A1 sync word
pub const MFM_SYNC_BYTE: u8 = 0xA1;

/// Data byte carried by an MFM C2 index sync word
pub const MFM_INDEX_SYNC_BYTE: u8 = 0xC2;

/// FM ID address mark: data FE, clock C7
pub const FM_IDAM: u16 = 0xF57E;

/// FM data address mark: data FB, clock C7
pub const FM_DAM: u16 = 0xF56F;

/// FM deleted data address mark: data F8, clock C7
pub const FM_DAM_DELETED: u16 = 0xF56A;

/// FM TRSDOS system data mark: data F9, clock C7
pub const FM_DAM_F9: u16 = 0xF56B;

/// FM TRSDOS directory data mark: data FA, clock C7
pub const FM_DAM_FA: u16 = 0xF56E;

/// FM RX02 double density data mark: data FD, clock C7
pub const FM_DAM_RX02: u16 = 0xF57B;

/// FM index address mark: data FC, clock D7
pub const FM_IAM: u16 = 0xF77A;

/// All FM clock-violating mark words recognised by the framer
pub const FM_MARKS: [u16; 7] = [
    FM_IDAM,
    FM_DAM,
    FM_DAM_DELETED,
    FM_DAM_F9,
    FM_DAM_FA,
    FM_DAM_RX02,
    FM_IAM,
];

/// ID address mark byte
pub const IDAM_MARK: u8 = 0xFE;

/// Index address mark byte
pub const IAM_MARK: u8 = 0xFC;

/// Nominal FM cell rate in Hz
pub const FM_CELL_RATE_HZ: u32 = 125_000;

/// Nominal MFM cell rate in Hz
pub const MFM_CELL_RATE_HZ: u32 = 250_000;

/// Maximum decoded track length in bytes
pub const MAX_TRACK_LEN: usize = 0x4000;

/// Maximum number of IDAM table entries per track
pub const MAX_IDAMS: usize = 64;

/// Maximum number of sector records per track
pub const MAX_SECTORS: usize = 64;

/// Minimum number of revolutions for weak-bit analysis
pub const MIN_REVOLUTIONS: usize = 2;

/// Maximum number of revolutions considered by any analysis
pub const MAX_REVOLUTIONS: usize = 10;

/// ID field length after the mark: C, H, R, N
pub const ID_FIELD_LEN: usize = 4;

/// FDC sector size code to actual byte size mapping
/// Index: size_code (0-7), Value: 128 << size_code
pub const FDC_SECTOR_SIZES: [usize; 8] = [
    128,    // 0
    256,    // 1
    512,    // 2
    1024,   // 3
    2048,   // 4
    4096,   // 5
    8192,   // 6
    16384,  // 7
];

/// Convert an FDC size code to a byte size, `None` for codes past the table
#[inline]
pub fn fdc_size_to_bytes(size_code: u8) -> Option<usize> {
    FDC_SECTOR_SIZES.get(size_code as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_codes() {
        assert_eq!(fdc_size_to_bytes(0), Some(128));
        assert_eq!(fdc_size_to_bytes(2), Some(512));
        assert_eq!(fdc_size_to_bytes(7), Some(16384));
        assert_eq!(fdc_size_to_bytes(8), None);
    }

    #[test]
    fn test_fm_marks_interleave_clock_c7() {
        // Odd cells of the mark words carry the data byte
        for (word, data) in [(FM_IDAM, 0xFE), (FM_DAM, 0xFB), (FM_DAM_DELETED, 0xF8)] {
            let mut byte = 0u8;
            for b in 0..8 {
                if word & (1 << (14 - 2 * b)) != 0 {
                    byte |= 1 << (7 - b);
                }
            }
            assert_eq!(byte, data);
        }
    }
}
