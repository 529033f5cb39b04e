/// CRC-16/CCITT as used by the ID and data fields of FM/MFM floppy formats
///
/// Polynomial 0x1021, initial value 0xFFFF, no reflection, no final XOR.
/// A field followed by its big-endian CRC checks to zero.

/// CRC polynomial
pub const CRC16_POLY: u16 = 0x1021;

/// Initial CRC register value
pub const CRC16_INIT: u16 = 0xFFFF;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC16_TABLE: [u16; 256] = build_table();

/// Feed bytes into an existing CRC value
#[inline]
pub fn crc16_update(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, &byte| {
        (crc << 8) ^ CRC16_TABLE[((crc >> 8) as u8 ^ byte) as usize]
    })
}

/// Compute the CRC of a complete buffer
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(CRC16_INIT, data)
}

/// Check a field whose last two bytes are its big-endian CRC
///
/// `preset` covers whatever precedes the field on disk, e.g. the MFM syncs.
pub fn check_field(preset: u16, field_with_crc: &[u8]) -> bool {
    field_with_crc.len() >= 2 && crc16_update(preset, field_with_crc) == 0
}

/// Incremental CRC-16 state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16(u16);

impl Crc16 {
    /// Start a new CRC computation
    pub fn new() -> Self {
        Crc16(CRC16_INIT)
    }

    /// Continue from a known register value
    pub fn with_preset(preset: u16) -> Self {
        Crc16(preset)
    }

    /// Feed bytes into the running CRC
    pub fn update(&mut self, data: &[u8]) {
        self.0 = crc16_update(self.0, data);
    }

    /// Current CRC value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_mfm_sync_preset() {
        // Three A1 sync bytes leave the register at the well known CDB4
        assert_eq!(crc16(&[0xA1, 0xA1, 0xA1]), 0xCDB4);
    }

    #[test]
    fn test_field_checks_to_zero() {
        let mut field = vec![0xA1, 0xA1, 0xA1, 0xFE, 0x02, 0x00, 0x05, 0x02];
        let crc = crc16(&field);
        field.extend_from_slice(&crc.to_be_bytes());
        assert!(check_field(CRC16_INIT, &field));
        assert!(check_field(crc16(&field[..3]), &field[3..]));

        field[5] ^= 0x01;
        assert!(!check_field(CRC16_INIT, &field));
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut state = Crc16::new();
        state.update(b"1234");
        state.update(b"56789");
        assert_eq!(state.value(), crc16(b"123456789"));

        let mut resumed = Crc16::with_preset(crc16(b"1234"));
        resumed.update(b"56789");
        assert_eq!(resumed, state);
    }

    #[test]
    fn test_short_field_fails() {
        assert!(!check_field(CRC16_INIT, &[0x00]));
    }
}
