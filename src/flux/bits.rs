/// Packed bit-cell stream, MSB first

/// A sequence of decoded bit cells packed eight to a byte, MSB first
///
/// The trailing partial byte is zero padded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitCellStream {
    bytes: Vec<u8>,
    len: usize,
}

impl BitCellStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty stream with room for `bits` cells
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            len: 0,
        }
    }

    /// Wrap packed bytes holding `bit_len` cells
    ///
    /// `bit_len` is clamped to the number of bits available.
    pub fn from_bytes(bytes: Vec<u8>, bit_len: usize) -> Self {
        let len = bit_len.min(bytes.len() * 8);
        let mut bytes = bytes;
        bytes.truncate(len.div_ceil(8));
        if len % 8 != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= 0xFFu8 << (8 - len % 8);
            }
        }
        Self { bytes, len }
    }

    /// Append one cell
    #[inline]
    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    /// Append `count` zero cells
    pub fn push_zeros(&mut self, count: usize) {
        for _ in 0..count {
            self.push(false);
        }
    }

    /// Append the low `count` bits of `word`, most significant first
    pub fn push_word(&mut self, word: u16, count: u32) {
        for i in (0..count.min(16)).rev() {
            self.push(word & (1 << i) != 0);
        }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the stream holds no cells
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read one cell
    #[inline]
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some(self.bytes[index / 8] & (0x80 >> (index % 8)) != 0)
    }

    /// Read 16 cells starting at `index` as a big-endian word
    pub fn window16(&self, index: usize) -> Option<u16> {
        if index + 16 > self.len {
            return None;
        }
        let mut word = 0u16;
        for i in 0..16 {
            let byte = self.bytes[(index + i) / 8];
            if byte & (0x80 >> ((index + i) % 8)) != 0 {
                word |= 0x8000 >> i;
            }
        }
        Some(word)
    }

    /// Packed bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the stream, returning the packed bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of `1` cells
    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }
}

impl FromIterator<bool> for BitCellStream {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut stream = BitCellStream::new();
        for bit in iter {
            stream.push(bit);
        }
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_packs_msb_first() {
        let stream: BitCellStream = [true, false, true].into_iter().collect();
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.as_bytes(), &[0b1010_0000]);
    }

    #[test]
    fn test_window16_unaligned() {
        let mut stream = BitCellStream::new();
        stream.push_zeros(3);
        stream.push_word(0x4489, 16);
        stream.push_zeros(5);
        assert_eq!(stream.window16(3), Some(0x4489));
        assert_eq!(stream.window16(9), None);
        assert_eq!(stream.window16(8), Some(0x9120));
    }

    #[test]
    fn test_from_bytes_clears_padding() {
        let stream = BitCellStream::from_bytes(vec![0xFF, 0xFF], 12);
        assert_eq!(stream.len(), 12);
        assert_eq!(stream.as_bytes(), &[0xFF, 0xF0]);
        assert_eq!(stream.count_ones(), 12);
    }

    #[test]
    fn test_get_out_of_range() {
        let stream: BitCellStream = [true].into_iter().collect();
        assert_eq!(stream.get(0), Some(true));
        assert_eq!(stream.get(1), None);
    }
}
