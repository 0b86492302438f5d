//! The cipher library's streaming mode.
//!
//! The attack consumes only the block primitive; the streaming interface is
//! the cipher's ordinary mode of use and is kept alongside it. A keystream
//! instance derives a session key from the operator's key material, refills
//! its LFSR from a fixed constant, and hands out one cryptobuffer byte at a
//! time, re-stepping the LFSR and re-enciphering after every eighth byte.

use crate::cipher::encrypt;
use crate::state::State;

const INITIAL_FILL: u64 = 0xcf17_af8a_107a_c0f5;
const KEY_MASK56: u64 = (1 << 56) - 1;

/// Truncates an input character to its 6-bit encoding.
fn char_to_byte(c: u8) -> u64 {
    u64::from(c & 0x3F)
}

/// Steps the LFSR once: the state shifts one position and the new bit 63 is
/// bit 1 XOR bit 33.
pub fn step_lfsr(s: State) -> State {
    let newbit = s.bit(33) ^ s.bit(1);
    let mut out = s.shift_left();
    out.set_bit(63, newbit);
    out
}

/// Advances the LFSR 64 positions, 31 bits at a time.
pub fn step_lfsr_64(s: State) -> State {
    let mask = ((1u64 << 31) - 1) << 33;
    let mut x = s.to_u64();

    let mut new31 = (x ^ (x << 32)) & mask;
    x = (x >> 31) | new31;
    new31 = (x ^ (x << 32)) & mask;
    x = (x >> 31) | new31;
    new31 = ((x << 29) ^ (x << 61)) & (3u64 << 62);
    x = (x >> 2) | new31;

    State::new(x)
}

/// A running keystream generator.
pub struct Keystream {
    lfsr: State,
    key: State,
    buffer: State,
    used: usize,
}

impl Keystream {
    /// Initializes the generator from a user key of at least 15 characters
    /// and a 3-character nonce.
    ///
    /// # Panics
    /// Panics if either string is too short.
    pub fn new(user_key: &str, nonce: &str) -> Keystream {
        let user_key = user_key.as_bytes();
        let nonce = nonce.as_bytes();
        assert!(user_key.len() >= 15, "user key must be at least 15 characters");
        assert!(nonce.len() >= 3, "nonce must be at least 3 characters");

        // preliminary key and lfsr fill from the two character strings
        let (prelim_key, mut lfsr) = Keystream::preliminary_fill(user_key, nonce);

        // first cipher call fixes the session key
        lfsr = step_lfsr_64(lfsr);
        let buffer = encrypt(prelim_key, lfsr);
        let key = State::new(buffer.to_u64() & KEY_MASK56)
            .swap_bits()
            .swap_bit_pairs()
            .swap_nibbles();

        // second call fills the first cryptobuffer from the fixed fill
        let lfsr = step_lfsr_64(State::new(INITIAL_FILL));
        let buffer = encrypt(key, lfsr);

        // the top three lfsr bytes carry the nonce from here on
        let mut raw = lfsr.to_u64() & ((1 << 40) - 1);
        for i in 0..3 {
            raw |= char_to_byte(nonce[2 - i]) << ((7 - i) * 8);
        }

        Keystream {
            lfsr: State::new(raw),
            key,
            buffer,
            used: 0,
        }
    }

    fn preliminary_fill(user_key: &[u8], nonce: &[u8]) -> (State, State) {
        let mut lfsr = 0u64;
        for i in 0..8 {
            lfsr |= char_to_byte(user_key[i]) << (8 * i);
            if i < 3 {
                lfsr ^= char_to_byte(nonce[i]) << (8 * i);
            }
        }

        let mut key = 0u64;
        for i in 0..7 {
            key |= char_to_byte(user_key[i + 8]) << (8 * i);
        }
        let key = State::new(key).swap_bits().swap_bit_pairs().swap_nibbles();

        (key, State::new(lfsr))
    }

    /// Returns the next keystream byte, refilling the cryptobuffer when all
    /// eight bytes have been used.
    pub fn next_byte(&mut self) -> u8 {
        if self.used >= 8 {
            self.lfsr = step_lfsr_64(self.lfsr);
            self.buffer = encrypt(self.key, self.lfsr);
            self.used = 0;
        }
        let byte = self.buffer.byte(self.used) as u8;
        self.used += 1;
        byte
    }

    /// The four-letter verification code the operator reads back after key
    /// entry; meaningful right after construction, before any bytes are
    /// drawn.
    pub fn checksum(&self) -> String {
        let buf = self.buffer.to_u64();
        (0..4)
            .map(|i| {
                let shift = (6 - 2 * i) * 8;
                let folded = ((buf >> shift) ^ (buf >> (shift + 12))) & 0xF;
                (b'A' + folded as u8) as char
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{step_lfsr, step_lfsr_64, Keystream};
    use crate::state::State;
    use proptest::prelude::*;

    #[test]
    fn sliced_lfsr_step_matches_64_single_steps() {
        proptest!(|(x in any::<u64>())| {
            let mut stepped = State::new(x);
            for _ in 0..64 {
                stepped = step_lfsr(stepped);
            }
            prop_assert_eq!(step_lfsr_64(State::new(x)), stepped);
        });
    }

    #[test]
    fn keystream_is_deterministic() {
        let mut a = Keystream::new("ABCDEFGHIJKLMNO", "XYZ");
        let mut b = Keystream::new("ABCDEFGHIJKLMNO", "XYZ");

        // span two cryptobuffer refills
        for _ in 0..20 {
            assert_eq!(a.next_byte(), b.next_byte());
        }
    }

    #[test]
    fn nonce_separates_keystreams() {
        let mut a = Keystream::new("ABCDEFGHIJKLMNO", "XYZ");
        let mut b = Keystream::new("ABCDEFGHIJKLMNO", "XYW");

        let a_bytes: Vec<u8> = (0..16).map(|_| a.next_byte()).collect();
        let b_bytes: Vec<u8> = (0..16).map(|_| b.next_byte()).collect();
        assert_ne!(a_bytes, b_bytes);
    }

    #[test]
    fn checksum_is_four_letters() {
        let stream = Keystream::new("ABCDEFGHIJKLMNO", "AAA");
        let checksum = stream.checksum();
        assert_eq!(checksum.len(), 4);
        assert!(checksum.bytes().all(|b| (b'A'..=b'P').contains(&b)));
    }
}
