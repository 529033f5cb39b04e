/// Sector and weak-bit map visualization

use crate::image::{DecodedTrack, SectorRecord};
use crate::reconcile::DiskResult;
use crate::weak::{ReadWeakBits, WeakBitReport};

/// ANSI color codes for the maps
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_WHITE: &str = "\x1b[97m";
    pub const DARK_WHITE: &str = "\x1b[37m";
    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_MAGENTA: &str = "\x1b[95m";
}

const BLOCK_NO_DATA: &str = "\u{2591}"; // ░ - Light shade (ID field only)
const BLOCK_HAS_DATA: &str = "\u{2593}"; // ▓ - Dark shade (data read)

/// Density ramp, lightest first
const SHADES: [char; 5] = [' ', '\u{2591}', '\u{2592}', '\u{2593}', '\u{2588}'];

fn sector_cell(track: &DecodedTrack, sector: &SectorRecord) -> String {
    let block = if sector.has_data() {
        BLOCK_HAS_DATA
    } else {
        BLOCK_NO_DATA
    };
    let weak = sector.has_data()
        && track.weak_bits().is_some_and(|mask| {
            (sector.data_offset as usize..sector.data_end())
                .any(|offset| mask.as_bytes().get(offset).is_some_and(|&b| b != 0))
        });

    let color = if !sector.id_crc_ok || (sector.has_data() && !sector.data_crc_ok) {
        colors::BRIGHT_RED
    } else if weak {
        colors::BRIGHT_MAGENTA
    } else if sector.is_deleted() {
        colors::BRIGHT_YELLOW
    } else if sector.has_data() {
        colors::BRIGHT_WHITE
    } else {
        colors::DARK_WHITE
    };
    format!("{}{}{}", color, block, colors::RESET)
}

/// Render a sector map for one head of a reconciled disk
///
/// One column per cylinder, one row per physical sector position, sector 0
/// at the bottom.
pub fn render_sector_map(disk: &DiskResult, head: u8) -> String {
    let mut out = String::new();
    let mut tracks: Vec<&DecodedTrack> = disk
        .tracks
        .iter()
        .map(|t| &t.merged)
        .filter(|t| t.physical_head == head)
        .collect();
    tracks.sort_by_key(|t| t.physical_track);

    let max_sectors = tracks.iter().map(|t| t.sector_count()).max().unwrap_or(0);
    if max_sectors == 0 {
        out.push_str(&format!("No sectors found on head {}.\n", head));
        return out;
    }
    let num_tracks = tracks
        .last()
        .map_or(0, |t| t.physical_track as usize + 1);

    out.push_str(&format!("=== Sector Map (Head {}) ===\n", head));
    out.push_str(&format!(
        "Legend: {}Good{} {}No Data{} {}CRC Error{} {}Weak Bits{} {}Deleted{}\n",
        colors::BRIGHT_WHITE, colors::RESET,
        colors::DARK_WHITE, colors::RESET,
        colors::BRIGHT_RED, colors::RESET,
        colors::BRIGHT_MAGENTA, colors::RESET,
        colors::BRIGHT_YELLOW, colors::RESET
    ));
    out.push('\n');

    for sector_pos in (0..max_sectors).rev() {
        out.push_str(&format!("{:>2} ", sector_pos));
        for cylinder in 0..num_tracks {
            let cell = tracks
                .iter()
                .find(|t| t.physical_track as usize == cylinder)
                .and_then(|t| t.sectors().get(sector_pos).map(|s| sector_cell(t, s)));
            match cell {
                Some(cell) => out.push_str(&cell),
                None => out.push(' '),
            }
        }
        out.push('\n');
    }

    // Cylinder axis, a label every five columns
    out.push_str("   ");
    let mut printed_cols = vec![false; num_tracks];
    for cylinder in 0..num_tracks {
        if cylinder % 5 == 0 && !printed_cols[cylinder] {
            for (i, digit) in cylinder.to_string().chars().enumerate() {
                let col = cylinder + i;
                if col < num_tracks {
                    out.push(digit);
                    printed_cols[col] = true;
                }
            }
        } else if !printed_cols[cylinder] {
            out.push(' ');
        }
    }
    out.push('\n');
    out
}

/// Render the weak-bit density along a track
///
/// The track is split into `width` equal buckets; each bucket is shaded by
/// its share of the busiest bucket's weak bits.
pub fn render_weak_map(report: &WeakBitReport, width: usize) -> String {
    let mut out = String::new();
    let width = width.max(1);
    out.push_str(&format!(
        "=== Weak Bits: {} in {} bytes ({:.2}/1000) ===\n",
        report.weak_bit_count(),
        report.bytes_analyzed,
        report.weak_bit_density
    ));
    if report.bytes_analyzed == 0 {
        return out;
    }

    let mut buckets = vec![0usize; width];
    for record in &report.records {
        let bucket = (record.offset as usize * width / report.bytes_analyzed).min(width - 1);
        buckets[bucket] += 1;
    }
    let peak = buckets.iter().copied().max().unwrap_or(0);

    out.push('|');
    for &count in &buckets {
        let shade = if count == 0 || peak == 0 {
            SHADES[0]
        } else {
            SHADES[1 + (count * (SHADES.len() - 2)) / peak]
        };
        if count > 0 {
            out.push_str(&format!("{}{}{}", colors::BRIGHT_MAGENTA, shade, colors::RESET));
        } else {
            out.push(shade);
        }
    }
    out.push_str("|\n");
    out.push_str(&format!("0{:>w$}\n", report.bytes_analyzed, w = width + 1));
    out
}

/// Render a sector table for one track
pub fn render_sector_table(track: &DecodedTrack) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Track {} head {}: {} ({} bytes, {} IDAMs)\n",
        track.physical_track,
        track.physical_head,
        track.encoding,
        track.track_length(),
        track.idam_table().len()
    ));
    out.push_str("  ID              Mark              Size  ID CRC  Data CRC  Offset\n");
    for sector in track.sectors() {
        let mark = sector.dam_type.map_or("-", |d| d.name());
        let data_crc = if !sector.has_data() {
            "none"
        } else if sector.data_crc_ok {
            "ok"
        } else {
            "BAD"
        };
        out.push_str(&format!(
            "  {:<15} {:<17} {:>4}  {:<6}  {:<8}  {:#06x}\n",
            sector.id.to_string(),
            mark,
            sector.data_size,
            if sector.id_crc_ok { "ok" } else { "BAD" },
            data_crc,
            sector.data_offset
        ));
    }
    out.push_str(&format!(
        "  read errors {}, CRC errors {}, missing {}, retries {}\n",
        track.stats.read_errors, track.stats.crc_errors, track.stats.missing_sectors, track.stats.retries
    ));
    out
}

/// Draw a sector map for one head
pub fn draw_sector_map(disk: &DiskResult, head: u8) {
    print!("{}", render_sector_map(disk, head));
}

/// Draw a weak-bit density map
pub fn draw_weak_map(report: &WeakBitReport, width: usize) {
    print!("{}", render_weak_map(report, width));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DamType, Encoding};
    use crate::framer::frame;
    use crate::image::{SectorFault, SectorId, TrackBuilder};
    use crate::reconcile::TrackResult;
    use crate::weak::{WeakBitRecord, WeakPattern};

    fn track(cylinder: u8, fault: SectorFault) -> DecodedTrack {
        let cells = TrackBuilder::new(Encoding::MFM)
            .gap(16, 0x4E)
            .sector(SectorId::new(cylinder, 0, 1, 0), &[0xE5; 128])
            .sector_with(SectorId::new(cylinder, 0, 2, 0), DamType::Deleted, &[0; 128], fault)
            .build_cells();
        frame(&cells, Encoding::MFM).into_track(cylinder, 0, Encoding::MFM)
    }

    fn disk(tracks: Vec<DecodedTrack>) -> DiskResult {
        DiskResult {
            tracks: tracks
                .into_iter()
                .map(|merged| TrackResult {
                    merged,
                    replaced: 0,
                    revolutions_used: 1,
                    weak: None,
                    protection: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sector_map_layout() {
        let map = render_sector_map(&disk(vec![track(0, SectorFault::None), track(1, SectorFault::BadDataCrc)]), 0);
        assert!(map.starts_with("=== Sector Map (Head 0) ==="));
        assert!(map.contains(colors::BRIGHT_RED));
        assert!(map.contains(colors::BRIGHT_YELLOW));
        assert!(map.contains(" 1 "));
        assert!(map.trim_end().ends_with('0'));
    }

    #[test]
    fn test_sector_map_empty_head() {
        let map = render_sector_map(&disk(vec![track(0, SectorFault::None)]), 1);
        assert_eq!(map, "No sectors found on head 1.\n");
    }

    #[test]
    fn test_weak_map_buckets() {
        let records = [10u32, 11, 12, 900]
            .iter()
            .map(|&offset| WeakBitRecord {
                offset,
                bit_position: 0,
                variation_percent: 100,
                sample_count: 2,
                samples: vec![0, 1],
                pattern: WeakPattern::Custom,
            })
            .collect();
        let report = WeakBitReport {
            records,
            bytes_analyzed: 1000,
            bits_analyzed: 8000,
            weak_bit_density: 0.5,
            ..Default::default()
        };
        let map = render_weak_map(&report, 10);
        let bar = map.lines().nth(1).unwrap();
        assert!(bar.starts_with(&format!("|{}\u{2588}", colors::BRIGHT_MAGENTA)));
        assert!(bar.contains('\u{2592}'));
        assert!(map.contains("4 in 1000 bytes"));
    }

    #[test]
    fn test_sector_table() {
        let table = render_sector_table(&track(3, SectorFault::NoData));
        assert!(table.contains("C3 H0 R1 N0"));
        assert!(table.contains("Normal"));
        assert!(table.contains("none"));
        assert!(table.contains("missing 1"));
    }

    #[test]
    fn test_sector_table_one_line_per_sector() {
        let track = track(0, SectorFault::None);
        let table = render_sector_table(&track);
        assert!(table.ends_with('\n'));
        assert_eq!(table.lines().count(), track.sector_count() + 3);
        assert!(table.lines().nth(1).unwrap().starts_with("  ID"));
    }
}
