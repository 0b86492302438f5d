//! The SBT block primitive: round operations, their inverses, and the
//! per-round control-bit derivation.
//!
//! A block encryption bit-permutes the 64-bit LFSR fill and then runs eight
//! rounds of grid permutation, byte permutation, nibble switch and S-box.
//! The control bits steering the grid permutation and the nibble switch are
//! derived per round from the 56-bit key and the LFSR fill, which is what
//! the meet-in-the-middle attack exploits: for a known input block every
//! round control is a known function of the key alone.

use crate::state::State;

/// Applied to the LFSR fill before round 0. Output bit `i` is input bit
/// `BIT_PERMUTATION[i]`.
static BIT_PERMUTATION: [usize; 64] = [
    19, 47, 48,  5, 62, 25, 13, 36,
    16, 44, 37, 51,  8, 57,  7, 26,
    33, 50, 20,  3, 41, 11, 27, 61,
    59, 18, 55, 14, 35,  1, 24, 45,
    10, 29, 63, 46,  6, 39, 52, 21,
     2, 60, 22, 15, 42, 30, 34, 53,
    17,  0, 49, 38, 28, 12, 58, 40,
    43, 32, 23, 31, 56,  9,  4, 54,
];

static BYTE_PERMUTATION: [usize; 8] = [3, 5, 1, 4, 6, 0, 7, 2];
static BYTE_PERMUTATION_INV: [usize; 8] = [5, 2, 7, 0, 3, 1, 4, 6];

/// One 16-entry S-box per nibble position.
static SBOX: [[u8; 16]; 16] = [
    [ 4, 15, 10,  1, 11,  2,  8,  0, 13,  5,  6, 12,  7,  3,  9, 14],
    [15, 10,  8, 13,  3,  0, 14,  2, 12,  6,  9,  1,  4, 11,  7,  5],
    [ 8, 11,  3, 14, 13, 10,  4, 15,  9,  0, 12,  6,  5,  7,  1,  2],
    [ 1,  8, 14, 10,  7,  4,  9, 13,  6,  3, 11,  5, 15,  0,  2, 12],
    [13,  2, 12,  9, 14,  7,  3,  1,  4,  8,  0, 15,  6, 10,  5, 11],
    [11,  7,  9,  5, 10,  1, 15,  6,  2, 12,  4, 13, 14,  8,  3,  0],
    [ 7, 13,  6,  8,  1,  3,  0,  4,  5, 15,  2, 14, 10, 12, 11,  9],
    [ 2,  4,  5, 12,  9, 11,  7,  8, 15, 14, 13, 10,  3,  1,  0,  6],
    [ 7, 15,  0, 12, 10,  8,  1, 11,  9, 13,  5,  3, 14,  2,  6,  4],
    [ 4,  9,  8,  5,  0,  6, 10, 14, 11,  2,  7, 15,  1,  3, 13, 12],
    [ 3, 14, 13,  9,  1,  4,  8,  6, 10,  0, 11,  5,  2, 15, 12,  7],
    [11, 10, 14,  0,  9, 13,  3,  2,  6, 12, 15,  7,  8,  5,  4,  1],
    [ 9,  7,  6, 13, 11, 15,  4, 12,  0,  8,  2, 14, 10,  1,  3,  5],
    [ 5,  2,  1,  4, 13, 14,  0,  9, 15, 11,  6, 12,  3, 10,  7,  8],
    [ 8, 13,  7, 14,  5,  0, 11, 10,  2,  3, 12,  1, 15,  4,  9,  6],
    [ 1,  5,  4,  6, 12, 10,  9, 15,  3, 14,  8,  0, 13,  7,  2, 11],
];

static SBOX_INV: [[u8; 16]; 16] = [
    [ 7,  3,  5, 13,  0,  9, 10, 12,  6, 14,  2,  4, 11,  8, 15,  1],
    [ 5, 11,  7,  4, 12, 15,  9, 14,  2, 10,  1, 13,  8,  3,  6,  0],
    [ 9, 14, 15,  2,  6, 12, 11, 13,  0,  8,  5,  1, 10,  4,  3,  7],
    [13,  0, 14,  9,  5, 11,  8,  4,  1,  6,  3, 10, 15,  7,  2, 12],
    [10,  7,  1,  6,  8, 14, 12,  5,  9,  3, 13, 15,  2,  0,  4, 11],
    [15,  5,  8, 14, 10,  3,  7,  1, 13,  2,  4,  0,  9, 11, 12,  6],
    [ 6,  4, 10,  5,  7,  8,  2,  0,  3, 15, 12, 14, 13,  1, 11,  9],
    [14, 13,  0, 12,  1,  2, 15,  6,  7,  4, 11,  5,  3, 10,  9,  8],
    [ 2,  6, 13, 11, 15, 10, 14,  0,  5,  8,  4,  7,  3,  9, 12,  1],
    [ 4, 12,  9, 13,  0,  3,  5, 10,  2,  1,  6,  8, 15, 14,  7, 11],
    [ 9,  4, 12,  0,  5, 11,  7, 15,  6,  3,  8, 10, 14,  2,  1, 13],
    [ 3, 15,  7,  6, 14, 13,  8, 11, 12,  4,  1,  0,  9,  5,  2, 10],
    [ 8, 13, 10, 14,  6, 15,  2,  1,  9,  0, 12,  4,  7,  3, 11,  5],
    [ 6,  2,  1, 12,  3,  0, 10, 14, 15,  7, 13,  9, 11,  4,  5,  8],
    [ 5, 11,  8,  9, 13,  4, 15,  2,  0, 14,  7,  6, 10,  1,  3, 12],
    [11,  0, 14,  8,  2,  1,  3, 13, 10,  6,  5, 15,  4, 12,  9,  7],
];

/// Per-round rotation of the two 28-bit key halves.
static RSHIFT: [usize; 8] = [5, 7, 9, 14, 19, 24, 26, 28];

/// Rotated-key taps for the eight nibble-switch control bits.
static NR_BITS: [usize; 8] = [35, 7, 32, 4, 29, 1, 54, 26];

/// Per-round rotation of the LFSR fill before it enters the grid controls.
static SR_BITS: [usize; 8] = [32, 40, 48, 56, 0, 8, 16, 24];

/// Rotated-key taps for the 32 grid control bits.
static KR_BITS: [usize; 32] = [
    10, 38, 13, 41, 16, 44, 19, 47,
    22, 50, 25, 53,  0, 28,  3, 31,
     6, 34,  9, 37, 12, 40, 15, 43,
    18, 46, 21, 49, 24, 52, 27, 55,
];

/// Applies the pre-round bit permutation to the LFSR fill.
pub fn bit_permutation(s: State) -> State {
    s.permute_bits(&BIT_PERMUTATION)
}

pub fn bit_permutation_inv(s: State) -> State {
    let mut out = State::new(0);
    for (i, &src) in BIT_PERMUTATION.iter().enumerate() {
        out.set_bit(src, s.bit(i));
    }
    out
}

/// Rotates each 28-bit half of the key right by `n` positions.
pub fn key_rotate_right(key: State, n: usize) -> State {
    const MASK28: u64 = (1 << 28) - 1;
    let n = n % 28;
    let x = key.to_u64() & MASK28;
    let y = (key.to_u64() >> 28) & MASK28;
    let x = ((x << n) | (x >> (28 - n))) & MASK28;
    let y = ((y << n) | (y >> (28 - n))) & MASK28;
    State::new(x | (y << 28))
}

/// Derives the control bits for `round` from the key and the LFSR fill.
///
/// Bits 0..7 of the result switch the per-byte nibble swap, bits 8..39 hold
/// the sixteen 2-bit grid controls (low bit of each pair first).
///
/// # Panics
/// Panics if `round >= 8`.
pub fn round_control(round: usize, key: State, lfsr: State) -> State {
    assert!(round < 8, "round index out of range");

    let rotated = key_rotate_right(key, RSHIFT[round]);
    let mut control = 0u64;

    for (i, &bit) in NR_BITS.iter().enumerate() {
        control ^= ((rotated.to_u64() >> bit) & 1) << i;
    }

    let sr = lfsr.rotate_right(SR_BITS[round]);
    for (i, &bit) in KR_BITS.iter().enumerate() {
        let b = ((rotated.to_u64() >> bit) ^ (sr.to_u64() >> (63 - i))) & 1;
        control |= b << (8 + i);
    }

    State::new(control)
}

/// Moves every nibble one step through its 4x4 grid.
///
/// Nibble `pos = n ^ 1` is read as `(row, col) = (value >> 2, value & 3)`
/// and stepped in the direction selected by its 2-bit control. When the step
/// wraps around the grid edge, the neighbour nibble at `pos ^ (8 >> nibcon)`
/// shears the perpendicular coordinate by `nb + (nb >> 2)` mod 4.
pub fn grid_permutation(s: State, control: State) -> State {
    let mut out = s;
    for n in 0..16 {
        let pos = n ^ 1;
        let nibble = out.nibble(pos);
        let mut row = nibble >> 2;
        let mut col = nibble & 3;
        let nibcon = ((control.to_u64() >> (8 + 2 * n)) & 3) as usize;

        match nibcon {
            // up
            0 => {
                if row == 0 {
                    let nb = out.nibble(pos ^ (8 >> nibcon));
                    col = (col + nb + (nb >> 2)) & 3;
                }
                row = row.wrapping_sub(1) & 3;
            }
            // down
            1 => {
                if row == 3 {
                    let nb = out.nibble(pos ^ (8 >> nibcon));
                    col = (col + nb + (nb >> 2)) & 3;
                }
                row = (row + 1) & 3;
            }
            // left
            2 => {
                if col == 0 {
                    let nb = out.nibble(pos ^ (8 >> nibcon));
                    row = (row + nb + (nb >> 2)) & 3;
                }
                col = col.wrapping_sub(1) & 3;
            }
            // right
            3 => {
                if col == 3 {
                    let nb = out.nibble(pos ^ (8 >> nibcon));
                    row = (row + nb + (nb >> 2)) & 3;
                }
                col = (col + 1) & 3;
            }
            _ => unreachable!(),
        }

        out.set_nibble(pos, (row << 2) | col);
    }
    out
}

/// Undoes `grid_permutation` by walking the nibbles in reverse order with
/// the step directions negated.
pub fn grid_permutation_inv(s: State, control: State) -> State {
    let mut out = s;
    for n in (0..16).rev() {
        let pos = n ^ 1;
        let nibble = out.nibble(pos);
        let mut row = nibble >> 2;
        let mut col = nibble & 3;
        let nibcon = ((control.to_u64() >> (8 + 2 * n)) & 3) as usize;

        match nibcon {
            0 => {
                if row == 3 {
                    let nb = out.nibble(pos ^ (8 >> nibcon));
                    col = col.wrapping_sub(nb + (nb >> 2)) & 3;
                }
                row = (row + 1) & 3;
            }
            1 => {
                if row == 0 {
                    let nb = out.nibble(pos ^ (8 >> nibcon));
                    col = col.wrapping_sub(nb + (nb >> 2)) & 3;
                }
                row = row.wrapping_sub(1) & 3;
            }
            2 => {
                if col == 3 {
                    let nb = out.nibble(pos ^ (8 >> nibcon));
                    row = row.wrapping_sub(nb + (nb >> 2)) & 3;
                }
                col = (col + 1) & 3;
            }
            3 => {
                if col == 0 {
                    let nb = out.nibble(pos ^ (8 >> nibcon));
                    row = row.wrapping_sub(nb + (nb >> 2)) & 3;
                }
                col = col.wrapping_sub(1) & 3;
            }
            _ => unreachable!(),
        }

        out.set_nibble(pos, (row << 2) | col);
    }
    out
}

/// Steps the single nibble `n` of a masked state through the grid.
///
/// Identical to the corresponding step of `grid_permutation`, except that a
/// neighbour nibble lying outside `bpmask` is unknown: its mod-4 shear is
/// replaced by `extra_crumb` and the second return value is true. Callers
/// enumerate `extra_crumb` over 0..4 when that happens; a single call with
/// crumb 0 suffices otherwise.
pub fn partial_grid_permutation(
    s: State,
    n: usize,
    bpmask: State,
    extra_crumb: u64,
    control: State,
) -> (State, bool) {
    let mut out = s;
    let pos = n ^ 1;
    let nibble = out.nibble(pos);
    let mut row = nibble >> 2;
    let mut col = nibble & 3;
    let nibcon = ((control.to_u64() >> (8 + 2 * n)) & 3) as usize;
    let mut crumb_used = false;

    match nibcon {
        0 => {
            if row == 0 {
                let nbpos = pos ^ (8 >> nibcon);
                if bpmask.nibble(nbpos) != 0 {
                    let nb = out.nibble(nbpos);
                    col = (col + nb + (nb >> 2)) & 3;
                } else {
                    col = (col + extra_crumb) & 3;
                    crumb_used = true;
                }
            }
            row = row.wrapping_sub(1) & 3;
        }
        1 => {
            if row == 3 {
                let nbpos = pos ^ (8 >> nibcon);
                if bpmask.nibble(nbpos) != 0 {
                    let nb = out.nibble(nbpos);
                    col = (col + nb + (nb >> 2)) & 3;
                } else {
                    col = (col + extra_crumb) & 3;
                    crumb_used = true;
                }
            }
            row = (row + 1) & 3;
        }
        2 => {
            if col == 0 {
                let nbpos = pos ^ (8 >> nibcon);
                if bpmask.nibble(nbpos) != 0 {
                    let nb = out.nibble(nbpos);
                    row = (row + nb + (nb >> 2)) & 3;
                } else {
                    row = (row + extra_crumb) & 3;
                    crumb_used = true;
                }
            }
            col = col.wrapping_sub(1) & 3;
        }
        3 => {
            if col == 3 {
                let nbpos = pos ^ (8 >> nibcon);
                if bpmask.nibble(nbpos) != 0 {
                    let nb = out.nibble(nbpos);
                    row = (row + nb + (nb >> 2)) & 3;
                } else {
                    row = (row + extra_crumb) & 3;
                    crumb_used = true;
                }
            }
            col = (col + 1) & 3;
        }
        _ => unreachable!(),
    }

    out.set_nibble(pos, (row << 2) | col);
    (out, crumb_used)
}

/// Masked single-nibble counterpart of `grid_permutation_inv`.
pub fn partial_grid_permutation_inv(
    s: State,
    n: usize,
    bpmask: State,
    extra_crumb: u64,
    control: State,
) -> (State, bool) {
    let mut out = s;
    let pos = n ^ 1;
    let nibble = out.nibble(pos);
    let mut row = nibble >> 2;
    let mut col = nibble & 3;
    let nibcon = ((control.to_u64() >> (8 + 2 * n)) & 3) as usize;
    let mut crumb_used = false;

    match nibcon {
        0 => {
            if row == 3 {
                let nbpos = pos ^ (8 >> nibcon);
                if bpmask.nibble(nbpos) != 0 {
                    let nb = out.nibble(nbpos);
                    col = col.wrapping_sub(nb + (nb >> 2)) & 3;
                } else {
                    col = col.wrapping_sub(extra_crumb) & 3;
                    crumb_used = true;
                }
            }
            row = (row + 1) & 3;
        }
        1 => {
            if row == 0 {
                let nbpos = pos ^ (8 >> nibcon);
                if bpmask.nibble(nbpos) != 0 {
                    let nb = out.nibble(nbpos);
                    col = col.wrapping_sub(nb + (nb >> 2)) & 3;
                } else {
                    col = col.wrapping_sub(extra_crumb) & 3;
                    crumb_used = true;
                }
            }
            row = row.wrapping_sub(1) & 3;
        }
        2 => {
            if col == 3 {
                let nbpos = pos ^ (8 >> nibcon);
                if bpmask.nibble(nbpos) != 0 {
                    let nb = out.nibble(nbpos);
                    row = row.wrapping_sub(nb + (nb >> 2)) & 3;
                } else {
                    row = row.wrapping_sub(extra_crumb) & 3;
                    crumb_used = true;
                }
            }
            col = (col + 1) & 3;
        }
        3 => {
            if col == 0 {
                let nbpos = pos ^ (8 >> nibcon);
                if bpmask.nibble(nbpos) != 0 {
                    let nb = out.nibble(nbpos);
                    row = row.wrapping_sub(nb + (nb >> 2)) & 3;
                } else {
                    row = row.wrapping_sub(extra_crumb) & 3;
                    crumb_used = true;
                }
            }
            col = col.wrapping_sub(1) & 3;
        }
        _ => unreachable!(),
    }

    out.set_nibble(pos, (row << 2) | col);
    (out, crumb_used)
}

pub fn byte_permutation(s: State) -> State {
    s.permute_bytes(&BYTE_PERMUTATION)
}

pub fn byte_permutation_inv(s: State) -> State {
    s.permute_bytes(&BYTE_PERMUTATION_INV)
}

/// Swaps the nibble halves of byte `i` when control bit `i` is set.
/// Self-inverse; there is no separate inverse.
pub fn nibble_switch(s: State, control: State) -> State {
    let mut x = s.to_u64();
    for i in 0..8 {
        if (control.to_u64() >> i) & 1 == 0 {
            continue;
        }
        let diff = ((x >> 4) ^ x) & (0xF << (8 * i));
        x ^= diff ^ (diff << 4);
    }
    State::new(x)
}

pub fn sbox_layer(s: State) -> State {
    let mut out = 0u64;
    for i in 0..16 {
        out |= u64::from(SBOX[i][s.nibble(i) as usize]) << (4 * i);
    }
    State::new(out)
}

pub fn sbox_layer_inv(s: State) -> State {
    let mut out = 0u64;
    for i in 0..16 {
        out |= u64::from(SBOX_INV[i][s.nibble(i) as usize]) << (4 * i);
    }
    State::new(out)
}

/// Encrypts one block: bit-permute the LFSR fill, then eight rounds of
/// grid permutation, byte permutation, nibble switch and S-box.
pub fn encrypt(key: State, lfsr: State) -> State {
    let mut state = bit_permutation(lfsr);
    for round in 0..8 {
        let control = round_control(round, key, lfsr);
        state = grid_permutation(state, control);
        state = byte_permutation(state);
        state = nibble_switch(state, control);
        state = sbox_layer(state);
    }
    state
}

/// Inverts `encrypt` for a known LFSR fill.
///
/// The round controls depend on the LFSR fill itself, so decryption is only
/// defined with respect to a known fill; `decrypt(k, p, encrypt(k, p))`
/// recovers `p`.
pub fn decrypt(key: State, lfsr: State, block: State) -> State {
    let mut state = block;
    for round in (0..8).rev() {
        let control = round_control(round, key, lfsr);
        state = sbox_layer_inv(state);
        state = nibble_switch(state, control);
        state = byte_permutation_inv(state);
        state = grid_permutation_inv(state, control);
    }
    bit_permutation_inv(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY_MASK: u64 = (1 << 56) - 1;

    /// Controls are 40 bits wide: 8 switch bits and 16 crumb controls.
    const CONTROL_MASK: u64 = (1 << 40) - 1;

    #[test]
    fn sbox_tables_are_inverse_pairs() {
        for i in 0..16 {
            for x in 0..16 {
                assert_eq!(SBOX_INV[i][SBOX[i][x] as usize] as usize, x);
            }
        }
    }

    #[test]
    fn byte_permutation_tables_are_inverse_pairs() {
        for i in 0..8 {
            assert_eq!(BYTE_PERMUTATION_INV[BYTE_PERMUTATION[i]], i);
        }
    }

    #[test]
    fn layers_invert() {
        let config = ProptestConfig {
            timeout: 1000,
            max_shrink_time: 1000,
            ..ProptestConfig::default()
        };

        proptest!(config, |(x in any::<u64>(), c in any::<u64>())| {
            let s = State::new(x);
            let control = State::new(c & CONTROL_MASK);

            prop_assert_eq!(grid_permutation_inv(grid_permutation(s, control), control), s);
            prop_assert_eq!(byte_permutation_inv(byte_permutation(s)), s);
            prop_assert_eq!(nibble_switch(nibble_switch(s, control), control), s);
            prop_assert_eq!(sbox_layer_inv(sbox_layer(s)), s);
            prop_assert_eq!(bit_permutation_inv(bit_permutation(s)), s);
        });
    }

    #[test]
    fn full_round_inverts() {
        proptest!(|(x in any::<u64>(), c in any::<u64>())| {
            let s = State::new(x);
            let control = State::new(c & CONTROL_MASK);

            let mut t = grid_permutation(s, control);
            t = byte_permutation(t);
            t = nibble_switch(t, control);
            t = sbox_layer(t);

            t = sbox_layer_inv(t);
            t = nibble_switch(t, control);
            t = byte_permutation_inv(t);
            t = grid_permutation_inv(t, control);

            prop_assert_eq!(t, s);
        });
    }

    #[test]
    fn cipher_round_trips() {
        proptest!(|(k in any::<u64>(), p in any::<u64>())| {
            let key = State::new(k & KEY_MASK);
            let plaintext = State::new(p);
            let ciphertext = encrypt(key, plaintext);
            prop_assert_eq!(decrypt(key, plaintext, ciphertext), plaintext);
        });
    }

    #[test]
    fn self_decrypt_round_trip() {
        let plaintext = State::new(0x0123_4567_89AB_CDEF);
        let key = State::new(0x00FE_DCBA_9876_5432);
        let ciphertext = encrypt(key, plaintext);
        assert_ne!(ciphertext, plaintext);
        assert_eq!(decrypt(key, plaintext, ciphertext), plaintext);
    }

    #[test]
    fn zero_inputs_give_zero_control() {
        for round in 0..8 {
            assert_eq!(
                round_control(round, State::new(0), State::new(0)),
                State::new(0)
            );
        }
    }

    #[test]
    #[should_panic]
    fn round_control_rejects_round_8() {
        round_control(8, State::new(0), State::new(0));
    }

    #[test]
    fn key_rotation_wraps_each_half() {
        // rotating by 28 is the identity on both halves
        proptest!(|(k in any::<u64>())| {
            let key = State::new(k & KEY_MASK);
            prop_assert_eq!(key_rotate_right(key, 28), key);
        });

        let key = State::new(0x0000_0001_0000_0001);
        let rotated = key_rotate_right(key, 1);
        assert_eq!(rotated.to_u64(), 0x0000_0002_0000_0002);
    }

    #[test]
    fn partial_grid_matches_full_grid_inside_the_mask() {
        let full = State::new(!0);

        proptest!(|(x in any::<u64>(), c in any::<u64>())| {
            let s = State::new(x);
            let control = State::new(c & CONTROL_MASK);

            let mut fwd = s;
            for n in 0..16 {
                let (next, crumb_used) = partial_grid_permutation(fwd, n, full, 0, control);
                prop_assert!(!crumb_used);
                fwd = next;
            }
            prop_assert_eq!(fwd, grid_permutation(s, control));

            let mut bwd = fwd;
            for n in (0..16).rev() {
                let (next, crumb_used) = partial_grid_permutation_inv(bwd, n, full, 0, control);
                prop_assert!(!crumb_used);
                bwd = next;
            }
            prop_assert_eq!(bwd, s);
        });
    }
}
