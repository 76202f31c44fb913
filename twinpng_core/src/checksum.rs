use flate2::Crc;

/// Largest prime below 2^16; both Adler-32 sums are kept modulo this.
pub const ADLER_MODULUS: u32 = 65521;

/// Bytes that can be summed before `b` could overflow a u32 and a reduction
/// is required.
const ADLER_NMAX: usize = 5552;

/// Running Adler-32 state, the checksum that closes a zlib stream.
///
/// The state can be resumed from a finished value with [`Adler32::from_checksum`],
/// so a checksum over `X ++ Y` may be computed from the checksum of `X` and
/// the bytes of `Y` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Default for Adler32 {
    fn default() -> Self {
        Self { a: 1, b: 0 }
    }
}

impl Adler32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously finished checksum value.
    pub fn from_checksum(value: u32) -> Self {
        Self {
            a: value & 0xffff,
            b: value >> 16,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(ADLER_NMAX) {
            for &byte in chunk {
                self.a += byte as u32;
                self.b += self.a;
            }
            self.a %= ADLER_MODULUS;
            self.b %= ADLER_MODULUS;
        }
    }

    pub fn checksum(&self) -> u32 {
        self.a | (self.b << 16)
    }
}

/// One-shot Adler-32 of `bytes`.
pub fn adler32(bytes: &[u8]) -> u32 {
    let mut state = Adler32::new();
    state.update(bytes);
    state.checksum()
}

/// CRC-32 over a chunk's type tag followed by its body, as stored in the
/// chunk's trailing four bytes.
pub fn chunk_crc(kind: &[u8; 4], body: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(body);
    crc.sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_one() {
        assert_eq!(adler32(b""), 1);
    }

    #[test]
    fn known_value() {
        // Reference value from the zlib documentation.
        assert_eq!(adler32(b"Wikipedia"), 0x11e6_0398);
    }

    #[test]
    fn resumes_from_finished_value() {
        let x = b"the first half of a stream, ";
        let y: Vec<u8> = (0..20_000u32).map(|i| (i * 31 % 251) as u8).collect();

        let mut resumed = Adler32::from_checksum(adler32(x));
        resumed.update(&y);

        let mut whole = x.to_vec();
        whole.extend_from_slice(&y);
        assert_eq!(resumed.checksum(), adler32(&whole));
    }

    #[test]
    fn large_input_stays_reduced() {
        let data = vec![0xffu8; 3 * ADLER_NMAX + 17];
        let mut slow_a = 1u64;
        let mut slow_b = 0u64;
        for &byte in &data {
            slow_a = (slow_a + byte as u64) % ADLER_MODULUS as u64;
            slow_b = (slow_b + slow_a) % ADLER_MODULUS as u64;
        }
        assert_eq!(adler32(&data), (slow_a | (slow_b << 16)) as u32);
    }

    #[test]
    fn iend_crc() {
        // Every PNG ends with the same IEND chunk: AE 42 60 82.
        assert_eq!(chunk_crc(b"IEND", b""), 0xae42_6082);
    }
}
