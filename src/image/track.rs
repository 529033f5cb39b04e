/// Decoded track data structures

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::format::{Encoding, MAX_IDAMS, MAX_SECTORS, MAX_TRACK_LEN};
use crate::image::sector::SectorRecord;
use crate::weak::WeakBitMask;

/// DMK flag marking a double density IDAM pointer
pub const IDAM_DOUBLE_DENSITY_FLAG: u16 = 0x8000;

/// Entry in a track's ID address mark table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdamEntry {
    /// Offset of the mark's first sync byte in the raw track buffer
    pub byte_offset: u16,
    /// Encoding the mark was found in
    pub density: Encoding,
}

impl IdamEntry {
    /// Create a new table entry
    pub fn new(byte_offset: u16, density: Encoding) -> Self {
        Self {
            byte_offset,
            density,
        }
    }

    /// DMK style pointer word: offset with the double density flag
    pub fn dmk_word(&self) -> u16 {
        if self.density.is_double_density() {
            self.byte_offset | IDAM_DOUBLE_DENSITY_FLAG
        } else {
            self.byte_offset
        }
    }
}

/// Error counters for one decoded or merged track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackStats {
    /// Orphan data marks and fields cut short by the end of the track
    pub read_errors: u32,
    /// Sectors with a bad ID or data CRC
    pub crc_errors: u32,
    /// ID fields without a data field, plus expected sectors never seen
    pub missing_sectors: u32,
    /// Extra revolutions consumed trying to recover bad sectors
    pub retries: u32,
}

/// A track decoded from one revolution, or merged from several
///
/// The track owns its raw byte buffer; IDAM entries and sector records are
/// offsets into it.
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    /// Physical cylinder the head was positioned on
    pub physical_track: u8,
    /// Physical head that read the track
    pub physical_head: u8,
    /// Encoding of the track (Mixed when both were found)
    pub encoding: Encoding,
    /// Error counters
    pub stats: TrackStats,
    raw_bytes: Vec<u8>,
    idam_table: Vec<IdamEntry>,
    sectors: Vec<SectorRecord>,
    weak_mask: Option<WeakBitMask>,
}

impl DecodedTrack {
    /// Create an empty track
    pub fn new(physical_track: u8, physical_head: u8, encoding: Encoding) -> Self {
        Self {
            physical_track,
            physical_head,
            encoding,
            stats: TrackStats::default(),
            raw_bytes: Vec::new(),
            idam_table: Vec::new(),
            sectors: Vec::new(),
            weak_mask: None,
        }
    }

    /// Assemble a track from framed parts
    ///
    /// The raw buffer is truncated to [`MAX_TRACK_LEN`]; IDAM entries and
    /// sectors that would point past it are dropped.
    pub fn from_parts(
        physical_track: u8,
        physical_head: u8,
        encoding: Encoding,
        mut raw_bytes: Vec<u8>,
        idam_table: Vec<IdamEntry>,
        sectors: Vec<SectorRecord>,
    ) -> Self {
        raw_bytes.truncate(MAX_TRACK_LEN);
        let len = raw_bytes.len();

        let mut track = Self::new(physical_track, physical_head, encoding);
        track.raw_bytes = raw_bytes;
        for entry in idam_table {
            if (entry.byte_offset as usize) < len {
                track.insert_idam(entry);
            }
        }
        for sector in sectors {
            if sector.data_end() <= len && (sector.idam_offset as usize) < len {
                track.push_sector(sector);
            }
        }
        track.refresh_stats();
        track
    }

    /// Raw decoded bytes
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    /// Track length in bytes
    pub fn track_length(&self) -> usize {
        self.raw_bytes.len()
    }

    /// IDAM table in physical order
    pub fn idam_table(&self) -> &[IdamEntry] {
        &self.idam_table
    }

    /// Sector records in physical order
    pub fn sectors(&self) -> &[SectorRecord] {
        &self.sectors
    }

    /// Number of sector records
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Check if this track has no sectors
    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    /// Find a sector by identity key
    pub fn find_sector(&self, key: (u8, u8, u8)) -> Option<&SectorRecord> {
        self.sectors.iter().find(|s| s.key() == key)
    }

    /// Data bytes of a sector record belonging to this track
    pub fn sector_data(&self, record: &SectorRecord) -> Option<&[u8]> {
        if !record.has_data() {
            return None;
        }
        self.raw_bytes
            .get(record.data_offset as usize..record.data_end())
    }

    /// Data of the first CRC-valid sector with the given identity
    pub fn read_sector(&self, cylinder: u8, head: u8, sector: u8) -> Option<&[u8]> {
        self.sectors
            .iter()
            .find(|s| s.key() == (cylinder, head, sector) && s.data_crc_ok)
            .and_then(|s| self.sector_data(s))
    }

    /// Number of sectors with intact ID and data fields
    pub fn good_sector_count(&self) -> usize {
        self.sectors.iter().filter(|s| s.is_good()).count()
    }

    /// Number of sectors with a bad ID or data CRC
    pub fn crc_error_count(&self) -> usize {
        self.sectors
            .iter()
            .filter(|s| !s.id_crc_ok || (s.has_data() && !s.data_crc_ok))
            .count()
    }

    /// Check if every sector read back intact
    pub fn is_clean(&self) -> bool {
        self.sectors.iter().all(|s| s.is_good())
    }

    /// IDAM table as DMK pointer words
    pub fn idam_words(&self) -> Vec<u16> {
        self.idam_table.iter().map(IdamEntry::dmk_word).collect()
    }

    /// Weak bits attached to this track, if any
    pub fn weak_mask(&self) -> Option<&WeakBitMask> {
        self.weak_mask.as_ref()
    }

    pub(crate) fn set_weak_mask(&mut self, mask: WeakBitMask) {
        self.weak_mask = Some(mask);
    }

    pub(crate) fn raw_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.raw_bytes
    }

    pub(crate) fn sectors_mut(&mut self) -> &mut [SectorRecord] {
        &mut self.sectors
    }

    /// Append a sector record, returning false once the table is full
    pub(crate) fn push_sector(&mut self, sector: SectorRecord) -> bool {
        if self.sectors.len() >= MAX_SECTORS {
            warn!(
                target: "fluxrecon::track",
                track = self.physical_track,
                head = self.physical_head,
                "sector table full, record dropped"
            );
            return false;
        }
        self.sectors.push(sector);
        true
    }

    /// Insert an IDAM entry keeping the table in offset order
    ///
    /// Duplicate offsets are ignored; returns false when nothing was added.
    pub(crate) fn insert_idam(&mut self, entry: IdamEntry) -> bool {
        if self.idam_table.len() >= MAX_IDAMS {
            return false;
        }
        match self
            .idam_table
            .binary_search_by_key(&entry.byte_offset, |e| e.byte_offset)
        {
            Ok(_) => false,
            Err(pos) => {
                self.idam_table.insert(pos, entry);
                true
            }
        }
    }

    /// Recompute the CRC and missing-sector counters from the records
    pub(crate) fn refresh_stats(&mut self) {
        self.stats.crc_errors = self.crc_error_count() as u32;
        self.stats.missing_sectors = self.sectors.iter().filter(|s| !s.has_data()).count() as u32;
    }
}
