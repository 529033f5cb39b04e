/// Variable-length flux interval stream
///
/// Each flux interval is the number of sample-clock ticks between two
/// consecutive transitions:
///
/// - `0..=249`: the byte is the interval
/// - `250..=254`, `n`: the interval is `250 + n`
/// - `255`, `255`, `b0`, `b1`, `b2`: the interval is the 24-bit little-endian value
/// - `255`, `n` with `n < 250`: legacy long form, the interval is `250 + n`
///
/// Any other `255` pair is an out-of-band opcode and carries no interval.
/// A truncated escape ends the stream.

/// Largest literal interval byte
pub const LITERAL_MAX: u8 = 249;

/// Escape byte introducing an opcode or a 24-bit interval
pub const ESCAPE: u8 = 255;

/// Largest interval that fits in the 24-bit long form
pub const INTERVAL_MAX: u32 = 0x00FF_FFFF;

/// Iterator over the intervals of a raw flux buffer
#[derive(Debug, Clone)]
pub struct FluxReader<'a> {
    data: &'a [u8],
    pos: usize,
    skipped_opcodes: usize,
}

impl<'a> FluxReader<'a> {
    /// Create a reader over a raw flux buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            skipped_opcodes: 0,
        }
    }

    /// Byte position of the next unread byte
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of out-of-band opcodes skipped so far
    pub fn skipped_opcodes(&self) -> usize {
        self.skipped_opcodes
    }

    fn byte(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }
}

impl Iterator for FluxReader<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            let first = self.byte(0)?;
            match first {
                0..=LITERAL_MAX => {
                    self.pos += 1;
                    return Some(first as u32);
                }
                250..=254 => {
                    let next = self.byte(1)?;
                    self.pos += 2;
                    return Some(250 + next as u32);
                }
                ESCAPE => {
                    let op = self.byte(1)?;
                    if op == ESCAPE {
                        let b0 = self.byte(2)?;
                        let b1 = self.byte(3)?;
                        let b2 = self.byte(4)?;
                        self.pos += 5;
                        return Some(u32::from_le_bytes([b0, b1, b2, 0]));
                    }
                    self.pos += 2;
                    if op <= LITERAL_MAX {
                        return Some(250 + op as u32);
                    }
                    self.skipped_opcodes += 1;
                }
            }
        }
    }
}

/// Encode intervals into the variable-length stream format
///
/// Values above [`INTERVAL_MAX`] are clamped.
pub fn encode_intervals(intervals: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(intervals.len());
    for &interval in intervals {
        push_interval(&mut out, interval);
    }
    out
}

/// Append one interval to an encoded stream
pub fn push_interval(out: &mut Vec<u8>, interval: u32) {
    let interval = interval.min(INTERVAL_MAX);
    if interval <= LITERAL_MAX as u32 {
        out.push(interval as u8);
    } else if interval <= 250 + 255 {
        out.push(250);
        out.push((interval - 250) as u8);
    } else {
        let [b0, b1, b2, _] = interval.to_le_bytes();
        out.extend_from_slice(&[ESCAPE, ESCAPE, b0, b1, b2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        let intervals: Vec<u32> = FluxReader::new(&[0, 1, 100, 249]).collect();
        assert_eq!(intervals, vec![0, 1, 100, 249]);
    }

    #[test]
    fn test_short_escape() {
        let intervals: Vec<u32> = FluxReader::new(&[250, 0, 254, 10, 7]).collect();
        assert_eq!(intervals, vec![250, 260, 7]);
    }

    #[test]
    fn test_long_escape() {
        let intervals: Vec<u32> =
            FluxReader::new(&[ESCAPE, ESCAPE, 0x34, 0x12, 0x01, 5]).collect();
        assert_eq!(intervals, vec![0x011234, 5]);
    }

    #[test]
    fn test_legacy_escape() {
        let intervals: Vec<u32> = FluxReader::new(&[ESCAPE, 20]).collect();
        assert_eq!(intervals, vec![270]);
    }

    #[test]
    fn test_opcode_skipped() {
        let mut reader = FluxReader::new(&[ESCAPE, 252, 42]);
        assert_eq!(reader.next(), Some(42));
        assert_eq!(reader.skipped_opcodes(), 1);
    }

    #[test]
    fn test_truncated_escape_ends_stream() {
        let intervals: Vec<u32> = FluxReader::new(&[10, ESCAPE, ESCAPE, 1]).collect();
        assert_eq!(intervals, vec![10]);
        let intervals: Vec<u32> = FluxReader::new(&[10, 251]).collect();
        assert_eq!(intervals, vec![10]);
    }

    #[test]
    fn test_encoder_forms() {
        assert_eq!(encode_intervals(&[72]), vec![72]);
        assert_eq!(encode_intervals(&[300]), vec![250, 50]);
        assert_eq!(
            encode_intervals(&[0x10000]),
            vec![ESCAPE, ESCAPE, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_encoder_feeds_reader() {
        let intervals = vec![1, 249, 250, 505, 506, 70_000];
        let decoded: Vec<u32> = FluxReader::new(&encode_intervals(&intervals)).collect();
        assert_eq!(decoded, intervals);
    }
}
