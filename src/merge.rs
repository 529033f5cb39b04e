/// Multi-revolution track merge
///
/// The first revolution is the working result. Every later revolution can
/// only improve it: a CRC-valid sector replaces a bad copy of the same
/// (cylinder, head, sector), or is added when the result never saw that
/// sector. A sector that is already good is never touched.

use std::ops::Range;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::image::{DecodedTrack, IdamEntry, MergedTrack, RevolutionSet, SectorId, SectorRecord};

/// Merge every revolution of a set into one track
///
/// Returns the merged track and the number of sectors replaced or added.
pub fn merge(revolutions: RevolutionSet<'_>) -> (MergedTrack, usize) {
    let mut result = revolutions.first().clone();
    let mut changed = 0;
    for candidate in &revolutions.tracks()[1..] {
        changed += merge_into(&mut result, candidate);
    }
    result.refresh_stats();

    info!(
        target: "fluxrecon::merge",
        track = result.physical_track,
        head = result.physical_head,
        revolutions = revolutions.len(),
        changed,
        crc_errors = result.stats.crc_errors,
        "revolutions_merged"
    );
    (result, changed)
}

/// Merge a slice of decoded revolutions
pub fn merge_tracks(tracks: &[DecodedTrack]) -> Result<(MergedTrack, usize)> {
    Ok(merge(RevolutionSet::new(tracks)?))
}

/// Merge two reads of the same track
pub fn merge_pair(base: &DecodedTrack, candidate: &DecodedTrack) -> (MergedTrack, usize) {
    let mut result = base.clone();
    let changed = merge_into(&mut result, candidate);
    result.refresh_stats();
    (result, changed)
}

/// Fold one candidate revolution into a working result
///
/// Returns the number of sectors replaced or added.
pub fn merge_into(result: &mut DecodedTrack, candidate: &DecodedTrack) -> usize {
    let mut changed = 0;

    for incoming in candidate.sectors().iter().filter(|s| s.data_crc_ok) {
        let existing = result
            .sectors()
            .iter()
            .position(|s| s.key() == incoming.key());

        match existing {
            Some(index) => {
                if result.sectors()[index].data_crc_ok {
                    continue;
                }
                if replace_sector(result, index, candidate, incoming) {
                    changed += 1;
                }
            }
            None => {
                if add_sector(result, candidate, incoming) {
                    changed += 1;
                }
            }
        }
    }

    if changed > 0 {
        debug!(
            target: "fluxrecon::merge",
            track = result.physical_track,
            head = result.physical_head,
            changed,
            "candidate_merged"
        );
    }
    changed
}

/// Find a sector other than `skip` whose bytes intersect `range`
fn overlapping_sector(result: &DecodedTrack, skip: Option<usize>, range: &Range<usize>) -> Option<SectorId> {
    result
        .sectors()
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .map(|(_, s)| s)
        .find(|s| {
            let footprint = s.footprint();
            footprint.start < range.end && range.start < footprint.end
        })
        .map(|s| s.id)
}

/// Copy a good sector over a bad one
///
/// The result's own data offset is kept when it read a data field. When it
/// missed the data mark, the data goes at the candidate's offset provided
/// that range is free.
fn replace_sector(
    result: &mut DecodedTrack,
    index: usize,
    candidate: &DecodedTrack,
    incoming: &SectorRecord,
) -> bool {
    let target = result.sectors()[index];
    let src = incoming.data_offset as usize..incoming.data_end();
    let dst_start = if target.has_data() {
        target.data_offset
    } else {
        incoming.data_offset
    };
    let dst = dst_start as usize..dst_start as usize + incoming.data_size as usize;

    if src.end > candidate.track_length() || dst.end > result.track_length() {
        warn!(
            target: "fluxrecon::merge",
            sector = %incoming.id,
            src_end = src.end,
            dst_end = dst.end,
            "replacement out of range, skipped"
        );
        return false;
    }
    if !target.has_data() {
        if let Some(other) = overlapping_sector(result, Some(index), &dst) {
            warn!(
                target: "fluxrecon::merge",
                sector = %incoming.id,
                %other,
                "replacement data overlaps another sector, skipped"
            );
            return false;
        }
    }

    result.raw_bytes_mut()[dst].copy_from_slice(&candidate.raw_bytes()[src]);
    result.sectors_mut()[index] = SectorRecord {
        data_offset: dst_start,
        idam_offset: target.idam_offset,
        ..*incoming
    };
    true
}

/// Add a sector the result never saw, at the candidate's physical offset
fn add_sector(result: &mut DecodedTrack, candidate: &DecodedTrack, incoming: &SectorRecord) -> bool {
    let range = incoming.data_offset as usize..incoming.data_end();
    if range.end > result.track_length() || range.end > candidate.track_length() {
        warn!(
            target: "fluxrecon::merge",
            sector = %incoming.id,
            data_end = range.end,
            "added sector falls past the end of the track, skipped"
        );
        return false;
    }
    if let Some(other) = overlapping_sector(result, None, &incoming.footprint()) {
        warn!(
            target: "fluxrecon::merge",
            sector = %incoming.id,
            %other,
            "added sector overlaps another sector, skipped"
        );
        return false;
    }
    if !result.push_sector(*incoming) {
        return false;
    }
    result.raw_bytes_mut()[range.clone()].copy_from_slice(&candidate.raw_bytes()[range]);
    if (incoming.idam_offset as usize) < result.track_length() {
        result.insert_idam(IdamEntry::new(incoming.idam_offset, incoming.encoding));
    }
    true
}
