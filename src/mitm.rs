//! The meet-in-the-middle validator.
//!
//! A candidate key is consistent with a byte path iff a masked state at the
//! round 3/4 boundary is reachable both forward from the known plaintext and
//! backward from the known ciphertext. Propagation keeps only the nibbles
//! selected by the evolving byte-path mask; whenever a grid step consults a
//! neighbour outside the mask, the unknown contribution is enumerated as
//! four crumb branches.

use fnv::FnvHashSet;
use smallvec::SmallVec;

use crate::attack::AttackContext;
use crate::cipher::{
    bit_permutation, byte_permutation, byte_permutation_inv, nibble_switch,
    partial_grid_permutation, partial_grid_permutation_inv, round_control, sbox_layer,
    sbox_layer_inv,
};
use crate::state::State;

type PartialGridStep = fn(State, usize, State, u64, State) -> (State, bool);

/// Applies one masked grid step to `input`, branching over the four crumb
/// values when the neighbour lies outside the mask.
fn crumb_branches(
    step: PartialGridStep,
    input: State,
    n: usize,
    bpmask: State,
    control: State,
) -> SmallVec<[State; 4]> {
    let (out, crumb_used) = step(input, n, bpmask, 0, control);
    let mut branches = smallvec![out & bpmask];
    if crumb_used {
        for crumb in 1..4 {
            let (out, _) = step(input, n, bpmask, crumb, control);
            branches.push(out & bpmask);
        }
    }
    branches
}

/// True iff `key` is consistent with the byte path `bpmask` for the
/// plaintext/ciphertext pair of `ctx`.
pub fn valid_mitm(ctx: &AttackContext, key: State, bpmask: State) -> bool {
    // ciphertext backward through rounds 7..4
    let mut mask = bpmask;
    let mut frontier = vec![ctx.output];

    for round in (4..8).rev() {
        let control = round_control(round, key, ctx.input);

        frontier = frontier.iter().map(|&s| sbox_layer_inv(s) & mask).collect();
        frontier = frontier
            .iter()
            .map(|&s| nibble_switch(s, control) & mask)
            .collect();

        mask = byte_permutation_inv(mask);
        frontier = frontier
            .iter()
            .map(|&s| byte_permutation_inv(s) & mask)
            .collect();

        for n in (0..16).rev() {
            if mask.nibble(n ^ 1) == 0 {
                continue;
            }
            let mut next = Vec::with_capacity(frontier.len());
            for &input in &frontier {
                next.extend(crumb_branches(
                    partial_grid_permutation_inv,
                    input,
                    n,
                    mask,
                    control,
                ));
            }
            frontier = next;
        }
    }

    let backward: FnvHashSet<State> = frontier.into_iter().collect();

    // plaintext forward through rounds 0..3
    let mut mask = bpmask;
    let mut frontier = vec![bit_permutation(ctx.input)];

    for round in 0..4 {
        let control = round_control(round, key, ctx.input);

        for n in 0..16 {
            if mask.nibble(n ^ 1) == 0 {
                continue;
            }
            let mut next = Vec::with_capacity(frontier.len());
            for &input in &frontier {
                next.extend(crumb_branches(
                    partial_grid_permutation,
                    input,
                    n,
                    mask,
                    control,
                ));
            }
            frontier = next;
        }

        if round == 2 {
            // collapse the crumb branches to distinct masked states; the
            // frontier stays bounded by the mask's value space
            let unique: FnvHashSet<State> = frontier.drain(..).collect();
            frontier.extend(unique);
        }

        mask = byte_permutation(mask);
        frontier = frontier
            .iter()
            .map(|&s| byte_permutation(s) & mask)
            .collect();
        frontier = frontier
            .iter()
            .map(|&s| nibble_switch(s, control) & mask)
            .collect();
        frontier = frontier.iter().map(|&s| sbox_layer(s) & mask).collect();
    }

    frontier.iter().any(|s| backward.contains(s))
}
