pub struct BitReader<'a> {
    buf: &'a [u8],
    // byte position of the next byte to pull into the accumulator
    position: usize,
    accumulator: u32,
    bits_in_accumulator: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            position: 0,
            accumulator: 0,
            bits_in_accumulator: 0,
        }
    }

    /// Reads `count` bits, least significant bit first. Returns `None` once the
    /// buffer cannot supply a full code.
    pub fn next(&mut self, count: u32) -> Option<u32> {
        debug_assert!(count <= 16);

        while self.bits_in_accumulator < count {
            let byte = *self.buf.get(self.position)?;
            self.position += 1;
            self.accumulator |= u32::from(byte) << self.bits_in_accumulator;
            self.bits_in_accumulator += 8;
        }

        let value = self.accumulator & ((1 << count) - 1);
        self.accumulator >>= count;
        self.bits_in_accumulator -= count;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::BitReader;

    #[test]
    fn it_works() {
        let buffer = &[
            0b10000100,
            0b10001111,
            0b10101001,
            0b11001011,
            0b11101101,
            0b00001111,
            0b10100011
        ];
        let mut reader = BitReader::new(buffer);
        assert_eq!(reader.next(3), Some(0b00000100));
        assert_eq!(reader.next(3), Some(0b00000000));
        assert_eq!(reader.next(3), Some(0b00000110));
        assert_eq!(reader.next(3), Some(0b00000111));
        assert_eq!(reader.next(3), Some(0b00000000));
        assert_eq!(reader.next(3), Some(0b00000011));
        assert_eq!(reader.next(3), Some(0b00000010));
        assert_eq!(reader.next(3), Some(0b00000101));
    }

    #[test]
    fn codes_span_byte_boundaries() {
        // 9-bit codes 0x100 and 0x1ff packed LSB first
        let buffer = &[0x00, 0xff, 0x03];
        let mut reader = BitReader::new(buffer);
        assert_eq!(reader.next(9), Some(0x100));
        assert_eq!(reader.next(9), Some(0x1ff));
        assert_eq!(reader.next(9), None);
    }

    #[test]
    fn runs_dry() {
        let mut reader = BitReader::new(&[0xab]);
        assert_eq!(reader.next(8), Some(0xab));
        assert_eq!(reader.next(1), None);
    }
}
