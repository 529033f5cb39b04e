/// MFM/FM sync search and sector framing
///
/// The bit-cell stream is consumed sixteen cells at a time: a clock cell and
/// a data cell for each of the eight data bits. Before each window the
/// framer looks for a clock-violating mark word starting anywhere in the
/// next sixteen cells and, if it finds one, realigns on it. Mark words emit
/// their data byte literally; every other window emits its data cells.
///
/// A second pass walks the recorded marks to build the IDAM table and the
/// sector records, checking each ID and data field's CRC.

use tracing::{debug, trace, warn};

use crate::crc::{check_field, crc16, CRC16_INIT};
use crate::flux::bits::BitCellStream;
use crate::format::constants::*;
use crate::format::{DamType, Encoding};
use crate::image::{DecodedTrack, IdamEntry, SectorId, SectorRecord, TrackStats};

/// Kind of mark found in the cell stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKind {
    /// MFM A1 sync word
    MfmSync,
    /// MFM C2 index sync word
    MfmIndex,
    /// FM clock-violating address mark
    Fm,
}

/// A run of consecutive mark words in the decoded byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRun {
    /// Offset of the first mark byte
    pub start: usize,
    /// Number of consecutive mark words
    pub len: usize,
    /// Kind of mark
    pub kind: MarkKind,
}

impl SyncRun {
    /// Offset of the address mark byte that identifies the field
    pub fn mark_offset(&self) -> usize {
        match self.kind {
            MarkKind::Fm => self.start,
            MarkKind::MfmSync | MarkKind::MfmIndex => self.start + self.len,
        }
    }

    /// Encoding the field following this run is written in
    pub fn density(&self) -> Encoding {
        match self.kind {
            MarkKind::Fm => Encoding::FM,
            MarkKind::MfmSync | MarkKind::MfmIndex => Encoding::MFM,
        }
    }
}

/// Output of framing one bit-cell stream
#[derive(Debug, Clone, Default)]
pub struct FramedTrack {
    /// Encoding found on the track
    pub encoding: Option<Encoding>,
    /// Demodulated bytes
    pub raw_bytes: Vec<u8>,
    /// Mark runs in physical order
    pub runs: Vec<SyncRun>,
    /// ID address marks in physical order
    pub idam_table: Vec<IdamEntry>,
    /// Sectors in physical order
    pub sectors: Vec<SectorRecord>,
    /// Orphan data marks and truncated fields
    pub read_errors: u32,
}

impl FramedTrack {
    /// Build a decoded track for a physical location
    pub fn into_track(self, physical_track: u8, physical_head: u8, requested: Encoding) -> DecodedTrack {
        let encoding = self.encoding.unwrap_or(requested);
        let read_errors = self.read_errors;
        let mut track = DecodedTrack::from_parts(
            physical_track,
            physical_head,
            encoding,
            self.raw_bytes,
            self.idam_table,
            self.sectors,
        );
        track.stats = TrackStats {
            read_errors,
            ..track.stats
        };
        track
    }
}

/// Extract the data cells (odd positions) of a sixteen-cell window
#[inline]
pub fn data_bits(word: u16) -> u8 {
    let mut byte = 0u8;
    for b in 0..8 {
        if word & (1 << (14 - 2 * b)) != 0 {
            byte |= 0x80 >> b;
        }
    }
    byte
}

/// Identify a mark word for the encodings being scanned
pub fn match_mark(word: u16, encoding: Encoding) -> Option<(MarkKind, u8)> {
    if encoding.scans_mfm() {
        if word == MFM_SYNC_A1 {
            return Some((MarkKind::MfmSync, MFM_SYNC_BYTE));
        }
        if word == MFM_SYNC_C2 {
            return Some((MarkKind::MfmIndex, MFM_INDEX_SYNC_BYTE));
        }
    }
    if encoding.scans_fm() && FM_MARKS.contains(&word) {
        return Some((MarkKind::Fm, data_bits(word)));
    }
    None
}

/// Demodulate a cell stream into bytes, recording mark runs
pub fn demodulate(bits: &BitCellStream, encoding: Encoding) -> (Vec<u8>, Vec<SyncRun>) {
    let mut raw = Vec::with_capacity((bits.len() / 16).min(MAX_TRACK_LEN));
    let mut runs: Vec<SyncRun> = Vec::new();
    let mut pos = 0usize;

    while let Some(word) = bits.window16(pos) {
        if raw.len() >= MAX_TRACK_LEN {
            warn!(
                target: "fluxrecon::framer",
                cells_left = bits.len() - pos,
                "track buffer full, remaining cells ignored"
            );
            break;
        }

        let found = match_mark(word, encoding).map(|m| (0, m)).or_else(|| {
            (1..16).find_map(|k| {
                bits.window16(pos + k)
                    .and_then(|w| match_mark(w, encoding))
                    .map(|m| (k, m))
            })
        });

        match found {
            Some((shift, (kind, byte))) => {
                pos += shift;
                let offset = raw.len();
                trace!(
                    target: "fluxrecon::framer",
                    cell = pos,
                    offset,
                    byte,
                    ?kind,
                    "mark"
                );
                match runs.last_mut() {
                    Some(run)
                        if run.kind == kind
                            && kind != MarkKind::Fm
                            && run.start + run.len == offset =>
                    {
                        run.len += 1;
                    }
                    _ => runs.push(SyncRun {
                        start: offset,
                        len: 1,
                        kind,
                    }),
                }
                raw.push(byte);
            }
            None => raw.push(data_bits(word)),
        }
        pos += 16;
    }

    (raw, runs)
}

/// Frame a bit-cell stream into an IDAM table, sector records and raw bytes
///
/// Never fails. Bad CRCs, orphan data marks and truncated fields are
/// recorded on the result. The IDAM table and sector list stop growing at
/// [`MAX_IDAMS`] and [`MAX_SECTORS`].
///
/// The IDAM table holds one entry per mark run, not per sync word: a run
/// of consecutive MFM A1 syncs yields a single entry at the first sync.
/// Runs ending in an ID mark or in no recognisable mark are recorded; runs
/// in front of a data mark or index mark are not.
pub fn frame(bits: &BitCellStream, encoding: Encoding) -> FramedTrack {
    let (raw_bytes, runs) = demodulate(bits, encoding);

    let mut idam_table: Vec<IdamEntry> = Vec::new();
    let mut sectors: Vec<SectorRecord> = Vec::new();
    let mut read_errors = 0u32;
    let mut pending: Option<usize> = None;
    let mut idam_overflow = false;

    let mut record_idam = |table: &mut Vec<IdamEntry>, run: &SyncRun| {
        if table.len() < MAX_IDAMS {
            table.push(IdamEntry::new(run.start as u16, run.density()));
        } else if !idam_overflow {
            idam_overflow = true;
            warn!(
                target: "fluxrecon::framer",
                offset = run.start,
                "IDAM table full, further marks ignored"
            );
        }
    };

    for run in &runs {
        if run.kind == MarkKind::MfmIndex {
            continue;
        }
        let mark_pos = run.mark_offset();
        let Some(&mark) = raw_bytes.get(mark_pos) else {
            continue;
        };
        let preset = match run.kind {
            MarkKind::Fm => CRC16_INIT,
            _ => crc16(&[MFM_SYNC_BYTE; 3]),
        };

        if mark == IDAM_MARK {
            record_idam(&mut idam_table, run);
            pending = None;
            let field_end = mark_pos + 1 + ID_FIELD_LEN + 2;
            let Some(field) = raw_bytes.get(mark_pos..field_end) else {
                read_errors += 1;
                continue;
            };
            if sectors.len() >= MAX_SECTORS {
                continue;
            }
            let id = SectorId::new(field[1], field[2], field[3], field[4]);
            let id_crc_ok = check_field(preset, field);
            sectors.push(SectorRecord::new(id, run.density(), run.start as u16, id_crc_ok));
            pending = Some(sectors.len() - 1);
        } else if let Some(dam) = DamType::from_mark(mark) {
            let Some(index) = pending.take() else {
                read_errors += 1;
                continue;
            };
            let record = &mut sectors[index];
            let data_offset = mark_pos + 1;
            record.dam_type = Some(dam);
            record.data_offset = data_offset as u16;

            let size = record.id.size_bytes().map(|size| match dam {
                DamType::Rx02 => size * 2,
                _ => size,
            });
            match size {
                Some(size) if data_offset + size + 2 <= raw_bytes.len() => {
                    record.data_size = size as u16;
                    record.data_crc_ok =
                        check_field(preset, &raw_bytes[mark_pos..data_offset + size + 2]);
                }
                Some(size) => {
                    record.data_size = size.min(raw_bytes.len() - data_offset) as u16;
                    record.data_crc_ok = false;
                    read_errors += 1;
                }
                None => {
                    record.data_size = 0;
                    record.data_crc_ok = false;
                    read_errors += 1;
                }
            }
        } else if mark == IAM_MARK {
            continue;
        } else {
            // Sync with no recognisable mark behind it
            record_idam(&mut idam_table, run);
        }
    }

    let has_mfm = runs.iter().any(|r| r.kind == MarkKind::MfmSync);
    let has_fm = runs.iter().any(|r| r.kind == MarkKind::Fm);
    let detected = match encoding {
        Encoding::Auto | Encoding::Mixed => match (has_mfm, has_fm) {
            (true, true) => Some(Encoding::Mixed),
            (true, false) => Some(Encoding::MFM),
            (false, true) => Some(Encoding::FM),
            (false, false) => None,
        },
        other => Some(other),
    };

    debug!(
        target: "fluxrecon::framer",
        cells = bits.len(),
        bytes = raw_bytes.len(),
        marks = runs.len(),
        idams = idam_table.len(),
        sectors = sectors.len(),
        read_errors,
        "track_framed"
    );

    FramedTrack {
        encoding: detected,
        raw_bytes,
        runs,
        idam_table,
        sectors,
        read_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{SectorFault, TrackBuilder};

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_data_bits() {
        assert_eq!(data_bits(MFM_SYNC_A1), 0xA1);
        assert_eq!(data_bits(MFM_SYNC_C2), 0xC2);
        assert_eq!(data_bits(FM_IDAM), 0xFE);
        assert_eq!(data_bits(0x9254), 0x4E);
    }

    #[test]
    fn test_single_sync_at_aligned_offset() {
        let mut bits = BitCellStream::new();
        bits.push_word(0xAAAA, 16);
        bits.push_word(0xAAAA, 16);
        bits.push_word(0xAAAA, 16);
        bits.push_word(MFM_SYNC_A1, 16);
        bits.push_word(0xAAAA, 16);
        bits.push_word(0xAAAA, 16);

        let framed = frame(&bits, Encoding::MFM);
        assert_eq!(framed.idam_table.len(), 1);
        assert_eq!(framed.idam_table[0].byte_offset, 3);
        assert_eq!(framed.raw_bytes[3], 0xA1);
        assert!(framed.sectors.is_empty());
    }

    #[test]
    fn test_single_sync_realigns() {
        let mut bits = BitCellStream::new();
        for _ in 0..2 {
            bits.push_word(0xAAAA, 16);
        }
        // Five stray cells push the sync off the sixteen-cell grid
        bits.push_word(0b10101, 5);
        bits.push_word(MFM_SYNC_A1, 16);
        bits.push_word(0x9254, 16);

        let framed = frame(&bits, Encoding::MFM);
        assert_eq!(framed.idam_table.len(), 1);
        assert_eq!(framed.idam_table[0].byte_offset, (32 + 5) as u16 / 16);
        assert_eq!(framed.raw_bytes, vec![0x00, 0x00, 0xA1, 0x4E]);
    }

    #[test]
    fn test_mfm_sector_framing() {
        let data = pattern(512, 7);
        let cells = TrackBuilder::new(Encoding::MFM)
            .gap(32, 0x4E)
            .sector(SectorId::new(2, 0, 5, 2), &data)
            .build_cells();

        let framed = frame(&cells, Encoding::MFM);
        assert_eq!(framed.encoding, Some(Encoding::MFM));
        assert_eq!(framed.sectors.len(), 1);
        assert_eq!(framed.idam_table.len(), 1);

        let sector = framed.sectors[0];
        assert_eq!(sector.id, SectorId::new(2, 0, 5, 2));
        assert!(sector.id_crc_ok);
        assert!(sector.data_crc_ok);
        assert_eq!(sector.dam_type, Some(DamType::Normal));
        assert_eq!(sector.data_size, 512);
        assert_eq!(sector.idam_offset, framed.idam_table[0].byte_offset);

        let start = sector.data_offset as usize;
        assert_eq!(&framed.raw_bytes[start..start + 512], data.as_slice());
    }

    #[test]
    fn test_idam_entry_per_run_not_per_sync() {
        let cells = TrackBuilder::new(Encoding::MFM)
            .gap(16, 0x4E)
            .sector(SectorId::new(0, 0, 1, 0), &[0x11; 128])
            .sector(SectorId::new(0, 0, 2, 0), &[0x22; 128])
            .build_cells();

        let framed = frame(&cells, Encoding::MFM);
        // Each sector has an A1 A1 A1 run before its ID mark and its data mark
        assert_eq!(framed.runs.len(), 4);
        assert!(framed.runs.iter().all(|r| r.len == 3));
        assert_eq!(framed.idam_table.len(), 2);
        for (entry, sector) in framed.idam_table.iter().zip(&framed.sectors) {
            assert_eq!(entry.byte_offset, sector.idam_offset);
            assert_eq!(framed.raw_bytes[entry.byte_offset as usize + 3], IDAM_MARK);
        }
    }

    #[test]
    fn test_fm_sector_framing() {
        let data = pattern(128, 3);
        let cells = TrackBuilder::new(Encoding::FM)
            .gap(16, 0xFF)
            .sector_with(SectorId::new(0, 0, 1, 0), DamType::Deleted, &data, SectorFault::None)
            .build_cells();

        let framed = frame(&cells, Encoding::FM);
        assert_eq!(framed.sectors.len(), 1);
        let sector = framed.sectors[0];
        assert_eq!(sector.encoding, Encoding::FM);
        assert!(sector.id_crc_ok && sector.data_crc_ok);
        assert_eq!(sector.dam_type, Some(DamType::Deleted));
        assert_eq!(framed.idam_table[0].density, Encoding::FM);
    }

    #[test]
    fn test_crc_faults_recorded() {
        let data = pattern(256, 1);
        let cells = TrackBuilder::new(Encoding::MFM)
            .gap(16, 0x4E)
            .sector_with(SectorId::new(0, 0, 1, 1), DamType::Normal, &data, SectorFault::BadIdCrc)
            .sector_with(SectorId::new(0, 0, 2, 1), DamType::Normal, &data, SectorFault::BadDataCrc)
            .sector_with(SectorId::new(0, 0, 3, 1), DamType::Normal, &data, SectorFault::NoData)
            .sector(SectorId::new(0, 0, 4, 1), &data)
            .build_cells();

        let track = frame(&cells, Encoding::MFM).into_track(0, 0, Encoding::MFM);
        let sectors = track.sectors();
        assert_eq!(sectors.len(), 4);
        assert!(!sectors[0].id_crc_ok && sectors[0].data_crc_ok);
        assert!(sectors[1].id_crc_ok && !sectors[1].data_crc_ok);
        assert!(!sectors[2].has_data());
        assert!(sectors[3].is_good());

        assert_eq!(track.stats.crc_errors, 2);
        assert_eq!(track.stats.missing_sectors, 1);
        assert_eq!(track.stats.read_errors, 0);
    }

    #[test]
    fn test_mixed_track_detected() {
        let data = pattern(128, 9);
        let cells = TrackBuilder::new(Encoding::FM)
            .gap(8, 0xFF)
            .sector(SectorId::new(0, 0, 1, 0), &data)
            .encoding(Encoding::MFM)
            .gap(16, 0x4E)
            .sector(SectorId::new(0, 0, 2, 0), &data)
            .build_cells();

        let framed = frame(&cells, Encoding::Auto);
        assert_eq!(framed.encoding, Some(Encoding::Mixed));
        assert_eq!(framed.sectors.len(), 2);
        assert!(framed.sectors.iter().all(|s| s.is_good()));
        assert_eq!(framed.sectors[0].encoding, Encoding::FM);
        assert_eq!(framed.sectors[1].encoding, Encoding::MFM);
    }

    #[test]
    fn test_idam_table_capped() {
        let mut builder = TrackBuilder::new(Encoding::MFM);
        for i in 0..70u8 {
            builder = builder
                .gap(4, 0x4E)
                .sync()
                .bytes(&[IDAM_MARK, 0, 0, i, 0, 0, 0]);
        }
        let framed = frame(&builder.build_cells(), Encoding::MFM);
        assert_eq!(framed.idam_table.len(), MAX_IDAMS);
        assert!(framed.idam_table.windows(2).all(|w| w[0].byte_offset < w[1].byte_offset));
    }

    #[test]
    fn test_orphan_data_mark_counted() {
        let cells = TrackBuilder::new(Encoding::MFM)
            .gap(16, 0x4E)
            .data_field(DamType::Normal, &[0u8; 128], false)
            .gap(16, 0x4E)
            .build_cells();
        let framed = frame(&cells, Encoding::MFM);
        assert!(framed.sectors.is_empty());
        assert!(framed.idam_table.is_empty());
        assert_eq!(framed.read_errors, 1);
    }

    #[test]
    fn test_truncated_data_field_stays_in_bounds() {
        let cells = TrackBuilder::new(Encoding::MFM)
            .gap(16, 0x4E)
            .id_field(SectorId::new(0, 0, 1, 2), false)
            .gap(22, 0x4E)
            .sync()
            .sync()
            .sync()
            .bytes(&[0xFB])
            .bytes(&[0x11; 100])
            .build_cells();

        let track = frame(&cells, Encoding::MFM).into_track(0, 0, Encoding::MFM);
        let sector = track.sectors()[0];
        assert!(sector.is_truncated());
        assert!(!sector.data_crc_ok);
        assert!(sector.data_end() <= track.track_length());
        assert_eq!(track.stats.read_errors, 1);
    }

    #[test]
    fn test_garbage_without_marks() {
        let bits: BitCellStream = (0..4096).map(|i| i % 3 == 0).collect();
        let framed = frame(&bits, Encoding::MFM);
        assert_eq!(framed.raw_bytes.len(), 256);
        assert!(framed.idam_table.is_empty());
        assert!(framed.sectors.is_empty());
    }
}
