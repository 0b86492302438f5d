//! Candidate-list construction and combination.
//!
//! One `List` per byte path holds every partial key (restricted to the
//! path's keymask) that the meet-in-the-middle validator accepts. Lists over
//! overlapping keymasks combine into lists over the union mask; the driver
//! folds all eight byte paths into the full-key candidate list.

use std::sync::mpsc;

use crate::keymask::determine_keymask;
use crate::mitm::valid_mitm;
use crate::state::State;
use crate::utility::SearchProgress;

// The number of threads used for parallel calls is fixed
lazy_static! {
    static ref THREADS: usize = num_cpus::get();
}

/// The four process-wide attack inputs, written once at start-up and shared
/// read-only by the search workers.
#[derive(Clone, Copy)]
pub struct AttackContext {
    /// The known plaintext block (the cipher's LFSR fill).
    pub input: State,
    /// The known ciphertext block.
    pub output: State,
    /// The true key; consulted only through the leak mask.
    pub key: State,
    /// Key bits assumed leaked. Zero disables pruning.
    pub leak_mask: State,
}

impl AttackContext {
    /// True iff `key` agrees with the true key on every leaked bit inside
    /// `keymask`.
    pub fn key_consistent(&self, key: State, keymask: State) -> bool {
        ((key ^ self.key) & (self.leak_mask & keymask)) == State::new(0)
    }
}

/// A byte-path candidate list: every key in `keylist` is zero outside
/// `keymask` and consistent with the path `bpmask`.
pub struct List {
    pub bpmask: State,
    pub keymask: State,
    pub keylist: Vec<State>,
}

/// Returns the `index`'th subset of `mask`, distributing the bits of
/// `index` over the set bits of `mask` from low to high.
fn subset_at(mask: u64, index: usize) -> u64 {
    let mut subset = 0;
    let mut remaining = mask;
    let mut index = index as u64;
    while remaining != 0 {
        let bit = remaining & remaining.wrapping_neg();
        if index & 1 == 1 {
            subset |= bit;
        }
        remaining ^= bit;
        index >>= 1;
    }
    subset
}

/// Builds the candidate list for the byte path covering byte `byte_index`.
///
/// Enumerates all keys confined to the path's keymask across the worker
/// pool, keeping those the validator accepts. The keylist is sorted, so the
/// result is independent of scheduling.
pub fn create_single_list(ctx: &AttackContext, byte_index: usize) -> List {
    let mut bpmask = State::new(0);
    bpmask.set_byte(byte_index, 0xFF);
    let keymask = determine_keymask(bpmask);
    let subsets = 1usize << keymask.to_u64().count_ones();

    println!(
        "Building list for byte path {} ({}-bit keymask, {} candidates):",
        byte_index,
        keymask.to_u64().count_ones(),
        subsets
    );

    let start = time::precise_time_s();
    let (result_tx, result_rx) = mpsc::channel();

    crossbeam_utils::thread::scope(|scope| {
        for t in 0..*THREADS {
            let result_tx = result_tx.clone();
            let ctx = *ctx;

            scope.spawn(move |_| {
                let mut progress =
                    SearchProgress::new((0..subsets).skip(t).step_by(*THREADS).len());
                let mut survivors = vec![];

                for index in (0..subsets).skip(t).step_by(*THREADS) {
                    let candidate = State::new(subset_at(keymask.to_u64(), index));

                    if ctx.key_consistent(candidate, keymask)
                        && valid_mitm(&ctx, candidate, bpmask)
                    {
                        survivors.push(candidate);
                    }

                    if t == 0 {
                        progress.tick();
                    }
                }

                result_tx
                    .send(survivors)
                    .expect("Thread could not send result");
            });
        }
    })
    .expect("Threads failed to join.");

    let mut keylist = vec![];
    for _ in 0..*THREADS {
        keylist.append(&mut result_rx.recv().expect("Main could not receive result"));
    }
    keylist.sort();

    println!(
        "{} candidates survive. [{:.2} s]",
        keylist.len(),
        time::precise_time_s() - start
    );

    List {
        bpmask,
        keymask,
        keylist,
    }
}

/// Combines two lists into the list over the union of their byte paths.
///
/// Each partial key of `a` is extended over the key bits `b` needs beyond
/// `a`'s keymask and re-validated under the union path, so candidates are
/// only ever pruned.
pub fn combine_lists(ctx: &AttackContext, a: &List, b: &List) -> List {
    let bpmask = a.bpmask | b.bpmask;
    let keymask = a.keymask | b.keymask;
    let extension_mask = (b.keymask & !a.keymask).to_u64();

    let start = time::precise_time_s();
    let (result_tx, result_rx) = mpsc::channel();

    crossbeam_utils::thread::scope(|scope| {
        for t in 0..*THREADS {
            let result_tx = result_tx.clone();
            let ctx = *ctx;
            let partials = &a.keylist;

            scope.spawn(move |_| {
                let mut progress =
                    SearchProgress::new(partials.iter().skip(t).step_by(*THREADS).len());
                let mut survivors = vec![];

                for &partial in partials.iter().skip(t).step_by(*THREADS) {
                    // decrement-and-mask walk over every extension, the
                    // empty one included
                    let mut z: u64 = 0;
                    loop {
                        z = z.wrapping_sub(1) & extension_mask;
                        let candidate = partial ^ State::new(z);

                        if ctx.key_consistent(candidate, keymask)
                            && valid_mitm(&ctx, candidate, bpmask)
                        {
                            survivors.push(candidate);
                        }

                        if z == 0 {
                            break;
                        }
                    }

                    if t == 0 {
                        progress.tick();
                    }
                }

                result_tx
                    .send(survivors)
                    .expect("Thread could not send result");
            });
        }
    })
    .expect("Threads failed to join.");

    let mut keylist = vec![];
    for _ in 0..*THREADS {
        keylist.append(&mut result_rx.recv().expect("Main could not receive result"));
    }
    keylist.sort();

    println!(
        "Combined {} x {} -> {} candidates. [{:.2} s]",
        a.keylist.len(),
        b.keylist.len(),
        keylist.len(),
        time::precise_time_s() - start
    );

    List {
        bpmask,
        keymask,
        keylist,
    }
}

/// Runs the full attack: one list per block byte, then the fixed combine
/// schedule. The returned list enumerates every 56-bit key consistent with
/// the plaintext/ciphertext pair on all eight byte paths.
pub fn recover_key(ctx: &AttackContext) -> List {
    let lists: Vec<List> = (0..8).map(|i| create_single_list(ctx, 7 - i)).collect();

    for (i, list) in lists.iter().enumerate() {
        println!("L{} size: {}", i + 1, list.keylist.len());
    }

    // start with the pair whose keymasks overlap the most, then grow the
    // combined mask outward one list at a time
    let mut combined = combine_lists(ctx, &lists[5], &lists[6]);
    println!("L67 size: {}", combined.keylist.len());

    for &i in &[0usize, 4, 7, 1, 2, 3] {
        combined = combine_lists(ctx, &combined, &lists[i]);
        println!("+L{} size: {}", i + 1, combined.keylist.len());
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::{combine_lists, create_single_list, subset_at, AttackContext};
    use crate::cipher::encrypt;
    use crate::keymask::determine_keymask;
    use crate::state::State;

    const KEY_MASK: u64 = (1 << 56) - 1;

    fn full_leak_context(key: u64, input: u64) -> AttackContext {
        let key = State::new(key);
        let input = State::new(input);
        AttackContext {
            input,
            output: encrypt(key, input),
            key,
            leak_mask: State::new(KEY_MASK),
        }
    }

    #[test]
    fn subset_at_matches_the_decrement_walk() {
        let mask: u64 = 0b1011_0100_1000_0110;
        let count = 1usize << mask.count_ones();

        let mut walked = vec![];
        let mut z: u64 = 0;
        loop {
            z = z.wrapping_sub(1) & mask;
            walked.push(z);
            if z == 0 {
                break;
            }
        }

        let mut indexed: Vec<u64> = (0..count).map(|i| subset_at(mask, i)).collect();

        assert_eq!(walked.len(), count);
        walked.sort();
        walked.dedup();
        assert_eq!(walked.len(), count);

        indexed.sort();
        indexed.dedup();
        assert_eq!(walked, indexed);
    }

    #[test]
    fn key_consistency_checks_only_leaked_mask_bits() {
        let ctx = AttackContext {
            input: State::new(0),
            output: State::new(0),
            key: State::new(0x00FF_0000_0000_00FF),
            leak_mask: State::new(0x0000_0000_0000_00FF),
        };

        // differs from the true key only outside the leak mask
        assert!(ctx.key_consistent(State::new(0x0000_0000_0000_00FF), State::new(!0)));
        // differs inside the leak mask, but outside the keymask
        assert!(ctx.key_consistent(State::new(0), State::new(0x0000_0000_0000_FF00)));
        // differs inside both
        assert!(!ctx.key_consistent(State::new(0), State::new(!0)));
    }

    #[test]
    fn fully_leaked_single_list_collapses_to_the_true_key() {
        let ctx = full_leak_context(0x0011_2233_4455_6677, 0x0123_4567_89AB_CDEF);
        let list = create_single_list(&ctx, 7);

        assert_eq!(list.keymask, determine_keymask(list.bpmask));
        assert_eq!(list.keylist, vec![ctx.key & list.keymask]);
    }

    #[test]
    fn fully_leaked_combination_keeps_the_true_key() {
        let ctx = full_leak_context(0x00A5_A5A5_A5A5_A5A5, 0xDEAD_BEEF_CAFE_BABE);
        let a = create_single_list(&ctx, 7);
        let b = create_single_list(&ctx, 6);
        let combined = combine_lists(&ctx, &a, &b);

        assert_eq!(combined.keymask, a.keymask | b.keymask);
        assert_eq!(combined.keylist, vec![ctx.key & combined.keymask]);

        // the combined candidate restricts back into both parents
        for &key in &combined.keylist {
            assert!(a.keylist.contains(&(key & a.keymask)));
            assert!(b.keylist.contains(&(key & b.keymask)));
        }
    }

    #[test]
    #[ignore] // full schedule; run with --ignored
    fn fully_leaked_schedule_recovers_the_key() {
        let ctx = full_leak_context(0x0011_2233_4455_6677, 0x0123_4567_89AB_CDEF);
        let list = super::recover_key(&ctx);
        assert_eq!(list.keylist, vec![ctx.key]);
    }
}
