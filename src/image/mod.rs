/// Decoded track data structures

/// Synthetic track builder
pub mod builder;
/// Sector ID and record definitions
pub mod sector;
/// Decoded track, IDAM table and statistics
pub mod track;

pub use builder::{SectorFault, TrackBuilder};
pub use sector::{SectorId, SectorRecord};
pub use track::{DecodedTrack, IdamEntry, TrackStats};

use crate::error::{FluxError, Result};
use crate::format::{MAX_REVOLUTIONS, MIN_REVOLUTIONS};

/// A merged track is a decoded track built from several revolutions
pub type MergedTrack = DecodedTrack;

/// Ordered, borrowed view of several reads of the same physical track
///
/// Revolutions are assumed to share the same start-of-track reference
/// (index synchronised capture). That alignment is the caller's contract and
/// is not verified here.
#[derive(Debug, Clone, Copy)]
pub struct RevolutionSet<'a> {
    tracks: &'a [DecodedTrack],
}

impl<'a> RevolutionSet<'a> {
    /// Wrap 2 to 10 decoded reads of one (cylinder, head)
    pub fn new(tracks: &'a [DecodedTrack]) -> Result<Self> {
        if tracks.len() < MIN_REVOLUTIONS {
            return Err(FluxError::NotEnoughRevolutions {
                found: tracks.len(),
                required: MIN_REVOLUTIONS,
            });
        }
        if tracks.len() > MAX_REVOLUTIONS {
            return Err(FluxError::invalid_input(format!(
                "{} revolutions supplied, at most {} supported",
                tracks.len(),
                MAX_REVOLUTIONS
            )));
        }
        let first = &tracks[0];
        if let Some(other) = tracks.iter().find(|t| {
            t.physical_track != first.physical_track || t.physical_head != first.physical_head
        }) {
            return Err(FluxError::invalid_input(format!(
                "revolution of track {}/{} mixed with track {}/{}",
                other.physical_track, other.physical_head, first.physical_track, first.physical_head
            )));
        }
        Ok(Self { tracks })
    }

    /// Number of revolutions
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false; a set holds at least two revolutions
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The revolutions in capture order
    pub fn tracks(&self) -> &'a [DecodedTrack] {
        self.tracks
    }

    /// First revolution
    pub fn first(&self) -> &'a DecodedTrack {
        &self.tracks[0]
    }

    /// Physical (cylinder, head) shared by all revolutions
    pub fn location(&self) -> (u8, u8) {
        (self.first().physical_track, self.first().physical_head)
    }

    /// Raw byte buffers of every revolution, for weak-bit analysis
    pub fn raw_views(&self) -> Vec<&'a [u8]> {
        self.tracks.iter().map(|t| t.raw_bytes()).collect()
    }

    /// Length of the shortest revolution
    pub fn common_length(&self) -> usize {
        self.tracks
            .iter()
            .map(DecodedTrack::track_length)
            .min()
            .unwrap_or(0)
    }
}
