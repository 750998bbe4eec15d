//! positional encoder and decoder over one disk block
//!
//! fields carry no framing; the decoder must consume them in the exact
//! order the encoder wrote them. this layout is the only persistent wire
//! format of the filesystem.

use crate::wal::{zero_block, Block};
use crate::BLOCK_SIZE;

/// encoder with exclusive ownership of the block it fills
///
/// starts over a zeroed block; running past the end of the block is a
/// caller bug and panics
pub struct Enc {
    b: Block,
    off: usize,
}

impl Enc {
    pub fn new() -> Self {
        Enc {
            b: zero_block(),
            off: 0,
        }
    }

    /// append a u64, little-endian
    pub fn put_int(&mut self, x: u64) {
        assert!(self.off + 8 <= BLOCK_SIZE, "encoder overran its block");
        self.b[self.off..self.off + 8].copy_from_slice(&x.to_le_bytes());
        self.off += 8;
    }

    pub fn put_ints(&mut self, xs: &[u64]) {
        for &x in xs {
            self.put_int(x);
        }
    }

    /// append one byte: 1 for true, 0 for false
    pub fn put_bool(&mut self, x: bool) {
        assert!(self.off < BLOCK_SIZE, "encoder overran its block");
        self.b[self.off] = x as u8;
        self.off += 1;
    }

    /// append raw bytes, no length prefix
    pub fn put_bytes(&mut self, bs: &[u8]) {
        assert!(self.off + bs.len() <= BLOCK_SIZE, "encoder overran its block");
        self.b[self.off..self.off + bs.len()].copy_from_slice(bs);
        self.off += bs.len();
    }

    /// append a length-prefixed string
    pub fn put_string(&mut self, s: &str) {
        self.put_int(s.len() as u64);
        self.put_bytes(s.as_bytes());
    }

    /// the finished block; bytes never written stay zero
    pub fn finish(self) -> Block {
        self.b
    }
}

impl Default for Enc {
    fn default() -> Self {
        Self::new()
    }
}

/// decoder over a borrowed block
pub struct Dec<'a> {
    b: &'a [u8],
    off: usize,
}

impl<'a> Dec<'a> {
    pub fn new(b: &'a Block) -> Self {
        Dec { b: &b[..], off: 0 }
    }

    pub fn get_int(&mut self) -> u64 {
        assert!(self.off + 8 <= BLOCK_SIZE, "decoder overran its block");
        let x = u64::from_le_bytes(self.b[self.off..self.off + 8].try_into().unwrap());
        self.off += 8;
        x
    }

    pub fn get_ints(&mut self, n: usize) -> Vec<u64> {
        (0..n).map(|_| self.get_int()).collect()
    }

    /// zero decodes to false, anything else to true
    pub fn get_bool(&mut self) -> bool {
        assert!(self.off < BLOCK_SIZE, "decoder overran its block");
        let x = self.b[self.off];
        self.off += 1;
        x != 0
    }

    pub fn get_bytes(&mut self, n: usize) -> Vec<u8> {
        assert!(self.off + n <= BLOCK_SIZE, "decoder overran its block");
        let bs = self.b[self.off..self.off + n].to_vec();
        self.off += n;
        bs
    }

    pub fn get_string(&mut self) -> String {
        let n = self.get_int() as usize;
        let bs = self.get_bytes(n);
        String::from_utf8(bs).expect("string field is not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_round_trip() {
        let mut enc = Enc::new();
        enc.put_int(32);
        enc.put_int((1 << 45) + (1 << 50));
        let b = enc.finish();
        let mut dec = Dec::new(&b);
        assert_eq!(dec.get_int(), 32);
        assert_eq!(dec.get_int(), (1 << 45) + (1 << 50));
    }

    #[test]
    fn test_int_is_little_endian() {
        let mut enc = Enc::new();
        enc.put_int(0x0102_0304);
        let b = enc.finish();
        assert_eq!(&b[..8], &[4, 3, 2, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_ints_round_trip() {
        for xs in [
            vec![34, 100, (1 << 20) + (1 << 40) + (1 << 50), 153 << 34],
            vec![],
            vec![2],
        ] {
            let mut enc = Enc::new();
            enc.put_ints(&xs);
            let b = enc.finish();
            let mut dec = Dec::new(&b);
            assert_eq!(dec.get_ints(xs.len()), xs);
        }
    }

    #[test]
    fn test_bool_round_trip() {
        for x in [true, false] {
            let mut enc = Enc::new();
            enc.put_bool(x);
            let b = enc.finish();
            assert_eq!(Dec::new(&b).get_bool(), x);
        }
    }

    #[test]
    fn test_nonzero_byte_decodes_true() {
        let mut enc = Enc::new();
        enc.put_bytes(&[7]);
        let b = enc.finish();
        assert!(Dec::new(&b).get_bool());
    }

    #[test]
    fn test_mixed_fields_round_trip() {
        struct Various {
            a: u64,
            b: String,
            c: bool,
            d: String,
            e: Vec<u8>,
        }
        let cases = [
            Various {
                a: 34,
                b: "foo".to_string(),
                c: false,
                d: String::new(),
                e: vec![3, 4],
            },
            Various {
                a: 0,
                b: "\u{17}\0\0y".to_string(),
                c: true,
                d: "hello there\n\0".to_string(),
                e: vec![0, 7],
            },
        ];
        for x in &cases {
            let mut enc = Enc::new();
            enc.put_int(x.a);
            enc.put_string(&x.b);
            enc.put_bool(x.c);
            enc.put_string(&x.d);
            enc.put_bytes(&x.e);
            let b = enc.finish();
            let mut dec = Dec::new(&b);
            assert_eq!(dec.get_int(), x.a);
            assert_eq!(dec.get_string(), x.b);
            assert_eq!(dec.get_bool(), x.c);
            assert_eq!(dec.get_string(), x.d);
            assert_eq!(dec.get_bytes(2), x.e);
        }
    }

    #[test]
    fn test_unwritten_tail_is_zero() {
        let mut enc = Enc::new();
        enc.put_int(u64::MAX);
        let b = enc.finish();
        assert!(b[8..].iter().all(|&x| x == 0));
    }

    #[test]
    #[should_panic(expected = "overran")]
    fn test_overrun_panics() {
        let mut enc = Enc::new();
        for _ in 0..BLOCK_SIZE / 8 {
            enc.put_int(1);
        }
        enc.put_int(1);
    }
}
