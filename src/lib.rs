/*!
# fluxrecon

A Rust library for turning raw floppy flux captures into decoded tracks,
reconciling several revolutions of the same track and finding weak bits.

## Features

- Variable-length flux interval stream decoding
- Software PLL with tunable gains and drift clamp
- MFM and FM sync detection, IDAM table and sector framing with CRC checks
- Multi-revolution merge that only ever improves a sector
- Weak-bit detection, session statistics and a protection signal
- Disk type presets and JSON read configuration

## Quick Start

```rust
use fluxrecon::{
    frame, merge_tracks, weak, Encoding, PllConfig, ReadConfig, SectorId, TrackBuilder,
};

// Synthesise one MFM sector and its flux, 144 sample ticks per cell
let flux = TrackBuilder::new(Encoding::MFM)
    .gap(32, 0x4E)
    .sector(SectorId::new(0, 0, 1, 2), &[0xE5; 512])
    .build_flux(144);

let config = ReadConfig {
    pll: PllConfig { cell_rate_hz: Some(500_000), max_cells: 4, ..PllConfig::default() },
    ..ReadConfig::default()
};

// Decode two revolutions and merge them
let reads: Vec<_> = (0..2)
    .map(|_| {
        let bits = fluxrecon::decode_with(&flux, config.sample_freq_hz, Encoding::MFM, &config.pll);
        frame(&bits, Encoding::MFM).into_track(0, 0, Encoding::MFM)
    })
    .collect();
let (merged, replaced) = merge_tracks(&reads)?;
assert_eq!(replaced, 0);
assert_eq!(merged.read_sector(0, 0, 1), Some(&[0xE5; 512][..]));

// Compare the raw reads bit by bit
let views: Vec<&[u8]> = reads.iter().map(|t| t.raw_bytes()).collect();
let report = weak::detect(&views, merged.track_length(), &config.weak_params())?;
assert_eq!(report.weak_bit_count(), 0);
# Ok::<(), fluxrecon::FluxError>(())
```

## Modules

- `flux`: Flux stream decoding, bit cells and the PLL
- `framer`: Sync search and sector framing
- `image`: Decoded track data structures and the synthetic track builder
- `merge`: Multi-revolution merge
- `weak`: Weak-bit detection and session statistics
- `reconcile`: Per-track and per-disk pipeline
- `error`: Error types and Result alias
*/

#![warn(missing_docs)]

/// CRC-16/CCITT
pub mod crc;
/// Error types and Result alias
pub mod error;
/// Flux stream decoding and the software PLL
pub mod flux;
/// Encodings, constants and read configuration
pub mod format;
/// MFM/FM sync search and sector framing
pub mod framer;
/// Decoded track data structures
pub mod image;
/// Sector and weak-bit map visualization
pub mod map;
/// Multi-revolution track merge
pub mod merge;
/// Copy protection signal
pub mod protection;
/// Track and disk reconciliation pipeline
pub mod reconcile;
/// Weak-bit detection
pub mod weak;

// Re-export common types
pub use error::{FluxError, Result};
pub use flux::{decode, decode_with, BitCellStream, FluxReader, Pll, PllConfig};
pub use format::{DamType, DiskType, Encoding, ReadConfig};
pub use framer::{frame, FramedTrack};
pub use image::{
    DecodedTrack, IdamEntry, MergedTrack, RevolutionSet, SectorFault, SectorId, SectorRecord,
    TrackBuilder, TrackStats,
};
pub use merge::{merge, merge_pair, merge_tracks};
pub use protection::{triggers_protection_signal, ProtectionResult};
pub use reconcile::{
    reconcile_disk, reconcile_track, DiskResult, TrackCapture, TrackControl, TrackResult,
};
#[cfg(feature = "parallel")]
pub use reconcile::par_reconcile_disk;
pub use weak::{
    AttachWeakBits, ReadWeakBits, SessionStats, WeakBitMask, WeakBitParams, WeakBitRecord,
    WeakBitReport, WeakPattern,
};
