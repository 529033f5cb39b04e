/// Builder for synthetic FM/MFM tracks
///
/// Produces the bit-cell stream (and a matching flux capture) that a drive
/// would read back from a track formatted with the given fields. Useful for
/// exercising the decoder without a capture device.

use crate::crc::Crc16;
use crate::flux::bits::BitCellStream;
use crate::flux::stream::push_interval;
use crate::format::constants::*;
use crate::format::{DamType, Encoding};
use crate::image::sector::SectorId;

/// Deliberate damage applied to a generated sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectorFault {
    /// Sector is written intact
    #[default]
    None,
    /// ID field CRC is wrong
    BadIdCrc,
    /// Data field CRC is wrong
    BadDataCrc,
    /// ID field is written without a data field
    NoData,
}

/// Builder for constructing encoded tracks
#[derive(Debug, Clone)]
pub struct TrackBuilder {
    encoding: Encoding,
    cells: BitCellStream,
    last_data_bit: bool,
    byte_count: usize,
}

impl TrackBuilder {
    /// Create a builder writing in the given encoding
    ///
    /// `Auto` and `Mixed` write MFM until [`TrackBuilder::encoding`] switches.
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            cells: BitCellStream::new(),
            last_data_bit: false,
            byte_count: 0,
        }
    }

    /// Switch the encoding used for subsequent fields
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    fn is_fm(&self) -> bool {
        matches!(self.encoding, Encoding::FM | Encoding::RX02)
    }

    /// Number of byte cells written so far
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    fn push_byte(&mut self, byte: u8) {
        for i in (0..8).rev() {
            let bit = byte & (1 << i) != 0;
            let clock = if self.is_fm() {
                true
            } else {
                !self.last_data_bit && !bit
            };
            self.cells.push(clock);
            self.cells.push(bit);
            self.last_data_bit = bit;
        }
        self.byte_count += 1;
    }

    fn push_mark_word(&mut self, word: u16) {
        self.cells.push_word(word, 16);
        self.last_data_bit = word & 1 != 0;
        self.byte_count += 1;
    }

    /// Write plain data bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        for &byte in data {
            self.push_byte(byte);
        }
        self
    }

    /// Write `count` copies of a gap byte
    pub fn gap(mut self, count: usize, byte: u8) -> Self {
        for _ in 0..count {
            self.push_byte(byte);
        }
        self
    }

    /// Write a single MFM A1 sync word
    pub fn sync(mut self) -> Self {
        self.push_mark_word(MFM_SYNC_A1);
        self
    }

    /// Write an address mark, returning the CRC state covering it
    fn address_mark(&mut self, mark: u8) -> Crc16 {
        let mut crc = Crc16::new();
        if self.is_fm() {
            let word = match mark {
                0xFE => FM_IDAM,
                0xFB => FM_DAM,
                0xF8 => FM_DAM_DELETED,
                0xF9 => FM_DAM_F9,
                0xFA => FM_DAM_FA,
                0xFD => FM_DAM_RX02,
                _ => FM_IAM,
            };
            self.push_mark_word(word);
            crc.update(&[mark]);
        } else {
            for _ in 0..3 {
                self.push_mark_word(MFM_SYNC_A1);
            }
            self.push_byte(mark);
            crc.update(&[MFM_SYNC_BYTE, MFM_SYNC_BYTE, MFM_SYNC_BYTE, mark]);
        }
        crc
    }

    fn push_crc(&mut self, crc: u16, corrupt: bool) {
        let crc = if corrupt { crc ^ 0x5A5A } else { crc };
        let [hi, lo] = crc.to_be_bytes();
        self.push_byte(hi);
        self.push_byte(lo);
    }

    /// Write an ID field: mark, CHRN and CRC
    pub fn id_field(mut self, id: SectorId, corrupt_crc: bool) -> Self {
        let mut crc = self.address_mark(IDAM_MARK);
        let chrn = [id.cylinder, id.head, id.sector, id.size_code];
        for &byte in &chrn {
            self.push_byte(byte);
        }
        crc.update(&chrn);
        self.push_crc(crc.value(), corrupt_crc);
        self
    }

    /// Write a data field: mark, data and CRC
    pub fn data_field(mut self, dam: DamType, data: &[u8], corrupt_crc: bool) -> Self {
        let mut crc = self.address_mark(dam.mark());
        for &byte in data {
            self.push_byte(byte);
        }
        crc.update(data);
        self.push_crc(crc.value(), corrupt_crc);
        self
    }

    /// Write a complete sector with standard gaps
    pub fn sector(self, id: SectorId, data: &[u8]) -> Self {
        self.sector_with(id, DamType::Normal, data, SectorFault::None)
    }

    /// Write a complete sector with a data mark type and optional damage
    pub fn sector_with(self, id: SectorId, dam: DamType, data: &[u8], fault: SectorFault) -> Self {
        let fm = self.is_fm();
        let (sync_len, gap_byte, gap2, gap3) = if fm {
            (6, 0xFF, 11, 27)
        } else {
            (12, 0x4E, 22, 54)
        };

        let builder = self
            .gap(sync_len, 0x00)
            .id_field(id, fault == SectorFault::BadIdCrc)
            .gap(gap2, gap_byte);
        let builder = if fault == SectorFault::NoData {
            builder
        } else {
            builder
                .gap(sync_len, 0x00)
                .data_field(dam, data, fault == SectorFault::BadDataCrc)
        };
        builder.gap(gap3, gap_byte)
    }

    /// Bit cells written so far
    pub fn cells(&self) -> &BitCellStream {
        &self.cells
    }

    /// Finish and return the bit-cell stream
    pub fn build_cells(self) -> BitCellStream {
        self.cells
    }

    /// Finish and return a flux capture with `ticks_per_cell` sample ticks per cell
    ///
    /// Each `1` cell becomes a transition; the interval before it covers the
    /// cells since the previous transition. Trailing zero cells carry no
    /// transition and are not represented.
    pub fn build_flux(self, ticks_per_cell: u32) -> Vec<u8> {
        let mut flux = Vec::with_capacity(self.cells.len() / 2);
        let mut run = 0u32;
        for i in 0..self.cells.len() {
            run += 1;
            if self.cells.get(i) == Some(true) {
                push_interval(&mut flux, run * ticks_per_cell);
                run = 0;
            }
        }
        flux
    }
}
