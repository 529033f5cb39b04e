/// Flux capture decoding

/// Packed bit-cell stream
pub mod bits;
/// Software phase-locked loop
pub mod pll;
/// Variable-length flux interval stream
pub mod stream;

pub use bits::BitCellStream;
pub use pll::{decode, decode_intervals, decode_with, Pll, PllConfig, MAX_BIT_CELLS};
pub use stream::{encode_intervals, FluxReader};
