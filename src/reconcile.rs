/// Per-track and per-disk reconciliation
///
/// Every revolution of a track is decoded and framed on its own, the
/// configured number of revolutions are merged, extra revolutions are spent
/// on sectors that stay bad, and the raw reads are compared for weak bits.
/// Tracks share no state, so a disk can be reconciled one track per worker.

use tracing::{debug, info};

use crate::error::{FluxError, Result};
use crate::flux::decode_with;
use crate::format::ReadConfig;
use crate::framer::frame;
use crate::image::{DecodedTrack, MergedTrack, RevolutionSet};
use crate::merge::{merge, merge_into};
use crate::protection::{self, ProtectionResult};
use crate::weak::{detect_with_stats, AttachWeakBits, SessionStats, WeakBitMask, WeakBitReport};

/// Raw flux captures of one physical track
#[derive(Debug, Clone, Default)]
pub struct TrackCapture {
    /// Cylinder the head was on
    pub cylinder: u8,
    /// Head that read the track
    pub head: u8,
    /// One flux buffer per revolution, in capture order
    pub revolutions: Vec<Vec<u8>>,
}

impl TrackCapture {
    /// Create an empty capture
    pub fn new(cylinder: u8, head: u8) -> Self {
        Self {
            cylinder,
            head,
            revolutions: Vec::new(),
        }
    }

    /// Add a revolution
    pub fn with_revolution(mut self, flux: Vec<u8>) -> Self {
        self.revolutions.push(flux);
        self
    }

    /// Physical location
    pub fn location(&self) -> (u8, u8) {
        (self.cylinder, self.head)
    }
}

/// Whether disk reconciliation should continue after a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackControl {
    /// Go on with the next track
    Continue,
    /// Stop and report an abort
    Abort,
}

/// Outcome of reconciling one track
#[derive(Debug, Clone)]
pub struct TrackResult {
    /// Merged track
    pub merged: MergedTrack,
    /// Sectors replaced or added while merging
    pub replaced: usize,
    /// Revolutions merged, retries included
    pub revolutions_used: usize,
    /// Weak-bit report, when at least two revolutions could be compared
    pub weak: Option<WeakBitReport>,
    /// Protection signalled by the weak-bit report
    pub protection: Option<ProtectionResult>,
}

impl TrackResult {
    /// Physical location
    pub fn location(&self) -> (u8, u8) {
        (self.merged.physical_track, self.merged.physical_head)
    }
}

/// Outcome of reconciling a set of tracks
#[derive(Debug, Clone, Default)]
pub struct DiskResult {
    /// Per-track results in capture order
    pub tracks: Vec<TrackResult>,
    /// Weak-bit session totals
    pub session: SessionStats,
}

impl DiskResult {
    /// Find a track's result
    pub fn track(&self, cylinder: u8, head: u8) -> Option<&TrackResult> {
        self.tracks.iter().find(|t| t.location() == (cylinder, head))
    }

    /// Sectors still failing a CRC over all tracks
    pub fn crc_errors(&self) -> u32 {
        self.tracks.iter().map(|t| t.merged.stats.crc_errors).sum()
    }

    /// Tracks flagged as protected
    pub fn protected_tracks(&self) -> impl Iterator<Item = &TrackResult> {
        self.tracks.iter().filter(|t| t.protection.is_some())
    }
}

/// Decode and frame one revolution
pub fn decode_revolution(flux: &[u8], cylinder: u8, head: u8, config: &ReadConfig) -> DecodedTrack {
    let bits = decode_with(flux, config.sample_freq_hz, config.encoding, &config.pll);
    frame(&bits, config.encoding).into_track(cylinder, head, config.encoding)
}

/// Reconcile one track with a throwaway session accumulator
pub fn reconcile_track(capture: &TrackCapture, config: &ReadConfig) -> Result<TrackResult> {
    let mut session = SessionStats::new();
    reconcile_track_with_stats(capture, config, &mut session)
}

/// Reconcile one track, folding its weak-bit report into `session`
pub fn reconcile_track_with_stats(
    capture: &TrackCapture,
    config: &ReadConfig,
    session: &mut SessionStats,
) -> Result<TrackResult> {
    config.validate()?;
    let (cylinder, head) = capture.location();
    if capture.revolutions.is_empty() {
        return Err(FluxError::invalid_input(format!(
            "no revolutions captured for track {}/{}",
            cylinder, head
        )));
    }
    if let Some(index) = capture.revolutions.iter().position(Vec::is_empty) {
        return Err(FluxError::invalid_input(format!(
            "revolution {} of track {}/{} is empty",
            index, cylinder, head
        )));
    }

    let decoded: Vec<DecodedTrack> = capture
        .revolutions
        .iter()
        .map(|flux| decode_revolution(flux, cylinder, head, config))
        .collect();
    for (index, rev) in decoded.iter().enumerate() {
        debug!(
            target: "fluxrecon::reconcile",
            cylinder,
            head,
            revolution = index,
            bytes = rev.track_length(),
            idams = rev.idam_table().len(),
            sectors = rev.sector_count(),
            crc_errors = rev.stats.crc_errors,
            "revolution_decoded"
        );
    }

    let base = (config.revolutions as usize).clamp(1, decoded.len());
    let (mut merged, mut replaced) = if base >= 2 {
        merge(RevolutionSet::new(&decoded[..base])?)
    } else {
        (decoded[0].clone(), 0)
    };

    // Spend spare revolutions only while sectors stay bad
    let mut retries = 0;
    for extra in &decoded[base..] {
        if merged.crc_error_count() == 0 || retries >= config.retries as usize {
            break;
        }
        replaced += merge_into(&mut merged, extra);
        retries += 1;
    }
    merged.refresh_stats();
    merged.stats.retries = retries as u32;
    if let Some(expected) = config.sectors_per_track {
        let absent = (expected as usize).saturating_sub(merged.sector_count());
        merged.stats.missing_sectors += absent as u32;
    }

    let weak = detect_weak_bits(&decoded, config, session)?;
    let protection = weak
        .as_ref()
        .and_then(|report| protection::detect(report, config.protection_threshold));
    if let Some(report) = weak.as_ref().filter(|r| !r.is_empty()) {
        merged.attach_weak_bits(WeakBitMask::from_report(report));
    }

    info!(
        target: "fluxrecon::reconcile",
        cylinder,
        head,
        encoding = %merged.encoding,
        sectors = merged.sector_count(),
        good = merged.good_sector_count(),
        crc_errors = merged.stats.crc_errors,
        missing = merged.stats.missing_sectors,
        replaced,
        retries,
        weak_bits = weak.as_ref().map_or(0, WeakBitReport::weak_bit_count),
        "track_reconciled"
    );

    Ok(TrackResult {
        merged,
        replaced,
        revolutions_used: base + retries,
        weak,
        protection,
    })
}

fn detect_weak_bits(
    decoded: &[DecodedTrack],
    config: &ReadConfig,
    session: &mut SessionStats,
) -> Result<Option<WeakBitReport>> {
    let params = config.weak_params();
    let used = decoded.len().min(params.revolution_count as usize);
    let views: Vec<&[u8]> = decoded[..used].iter().map(DecodedTrack::raw_bytes).collect();
    let length = views.iter().map(|v| v.len()).min().unwrap_or(0);
    if used < 2 || length == 0 {
        debug!(
            target: "fluxrecon::reconcile",
            revolutions = used,
            length,
            "weak-bit analysis skipped"
        );
        return Ok(None);
    }
    detect_with_stats(&views, length, &params, session).map(Some)
}

/// Reconcile every capture in order
///
/// `on_track` runs after each track; returning [`TrackControl::Abort`]
/// stops the run with [`FluxError::Aborted`] naming that track.
pub fn reconcile_disk<F>(captures: &[TrackCapture], config: &ReadConfig, mut on_track: F) -> Result<DiskResult>
where
    F: FnMut(&TrackResult) -> TrackControl,
{
    config.validate()?;
    let mut result = DiskResult::default();
    for capture in captures {
        let track = reconcile_track_with_stats(capture, config, &mut result.session)?;
        if on_track(&track) == TrackControl::Abort {
            let (cylinder, head) = capture.location();
            info!(target: "fluxrecon::reconcile", cylinder, head, "reconciliation aborted");
            return Err(FluxError::Aborted { cylinder, head });
        }
        result.tracks.push(track);
    }
    info!(
        target: "fluxrecon::reconcile",
        tracks = result.tracks.len(),
        crc_errors = result.crc_errors(),
        protections = result.session.protections_detected,
        "disk_reconciled"
    );
    Ok(result)
}

/// Reconcile every capture with one rayon task per track
///
/// Results come back in capture order. An abort from `on_track` fails the
/// whole run; tracks already running finish first.
#[cfg(feature = "parallel")]
pub fn par_reconcile_disk<F>(captures: &[TrackCapture], config: &ReadConfig, on_track: F) -> Result<DiskResult>
where
    F: Fn(&TrackResult) -> TrackControl + Sync,
{
    use rayon::prelude::*;

    config.validate()?;
    let per_track: Vec<(TrackResult, SessionStats)> = captures
        .par_iter()
        .map(|capture| {
            let mut session = SessionStats::new();
            let track = reconcile_track_with_stats(capture, config, &mut session)?;
            if on_track(&track) == TrackControl::Abort {
                let (cylinder, head) = capture.location();
                return Err(FluxError::Aborted { cylinder, head });
            }
            Ok((track, session))
        })
        .collect::<Result<_>>()?;

    let mut result = DiskResult::default();
    for (track, session) in per_track {
        result.session.combine(&session);
        result.tracks.push(track);
    }
    Ok(result)
}
