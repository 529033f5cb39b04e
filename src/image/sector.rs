/// Sector data structures

use serde::{Deserialize, Serialize};

use std::ops::Range;

use crate::format::constants::{fdc_size_to_bytes, ID_FIELD_LEN};
use crate::format::{DamType, Encoding};

/// Three syncs, the mark, the ID bytes and the CRC
const ID_FIELD_SPAN: usize = 3 + 1 + ID_FIELD_LEN + 2;

/// Sector ID (CHRN) - addressing information read from an ID field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorId {
    /// C - Cylinder number
    pub cylinder: u8,
    /// H - Head number
    pub head: u8,
    /// R - Sector ID/Record number
    pub sector: u8,
    /// N - Size code (0=128, 1=256, 2=512, 3=1024, ...)
    pub size_code: u8,
}

impl SectorId {
    /// Create a new sector ID
    pub fn new(cylinder: u8, head: u8, sector: u8, size_code: u8) -> Self {
        Self {
            cylinder,
            head,
            sector,
            size_code,
        }
    }

    /// Identity key used to match the same sector across revolutions
    pub fn key(&self) -> (u8, u8, u8) {
        (self.cylinder, self.head, self.sector)
    }

    /// Advertised sector size in bytes (`128 << size_code`)
    pub fn size_bytes(&self) -> Option<usize> {
        fdc_size_to_bytes(self.size_code)
    }
}

impl std::fmt::Display for SectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "C{} H{} R{} N{}",
            self.cylinder, self.head, self.sector, self.size_code
        )
    }
}

/// A sector found on a decoded track
///
/// The record holds offsets into its track's raw byte buffer, never a copy
/// of the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorRecord {
    /// Sector addressing information (CHRN)
    pub id: SectorId,
    /// Encoding of the ID field
    pub encoding: Encoding,
    /// Data address mark type, `None` if no data field followed the ID
    pub dam_type: Option<DamType>,
    /// ID field CRC matched
    pub id_crc_ok: bool,
    /// Data field CRC matched
    pub data_crc_ok: bool,
    /// Offset of the ID field's first sync/mark byte
    pub idam_offset: u16,
    /// Offset of the first data byte
    pub data_offset: u16,
    /// Number of data bytes present at `data_offset`
    pub data_size: u16,
}

impl SectorRecord {
    /// Create a record for an ID field with no data field yet
    pub fn new(id: SectorId, encoding: Encoding, idam_offset: u16, id_crc_ok: bool) -> Self {
        Self {
            id,
            encoding,
            dam_type: None,
            id_crc_ok,
            data_crc_ok: false,
            idam_offset,
            data_offset: 0,
            data_size: 0,
        }
    }

    /// Identity key `(cylinder, head, sector)`
    pub fn key(&self) -> (u8, u8, u8) {
        self.id.key()
    }

    /// Check if a data field was found
    pub fn has_data(&self) -> bool {
        self.dam_type.is_some()
    }

    /// Check if both the ID and data fields are intact
    pub fn is_good(&self) -> bool {
        self.id_crc_ok && self.data_crc_ok
    }

    /// Check if this sector carries a deleted data mark
    pub fn is_deleted(&self) -> bool {
        self.dam_type == Some(DamType::Deleted)
    }

    /// End of the data field (exclusive)
    pub fn data_end(&self) -> usize {
        self.data_offset as usize + self.data_size as usize
    }

    /// Bytes this sector occupies, from its sync run to the end of its data
    ///
    /// Without a data field the range covers the sync run, mark, ID bytes
    /// and CRC.
    pub fn footprint(&self) -> Range<usize> {
        let start = self.idam_offset as usize;
        let id_end = start + ID_FIELD_SPAN;
        if self.has_data() {
            start..self.data_end().max(id_end)
        } else {
            start..id_end
        }
    }

    /// Check if the data field was cut short by the end of the track
    pub fn is_truncated(&self) -> bool {
        match self.id.size_bytes() {
            Some(size) => self.has_data() && (self.data_size as usize) < size,
            None => false,
        }
    }
}
