//! Attack driver: recovers an SBT key from a known plaintext/ciphertext pair.

use std::process;

use itertools::Itertools;
use structopt::StructOpt;

use sbtcrack::attack::{recover_key, AttackContext};
use sbtcrack::cipher;
use sbtcrack::options::AttackOptions;
use sbtcrack::state::State;
use sbtcrack::utility::write_states;

fn print_help() {
    AttackOptions::clap()
        .print_help()
        .expect("Could not print help");
    println!();
}

fn main() {
    let options = AttackOptions::from_args();

    let input = match options.input {
        Some(input) => State::new(input),
        None => {
            print_help();
            return;
        }
    };
    if options.key.is_none() && options.output.is_none() {
        print_help();
        return;
    }

    let key = options.key.unwrap_or(0);
    if key >> 56 != 0 {
        eprintln!("The key must fit in 56 bits.");
        process::exit(1);
    }
    let key = State::new(key);

    let output = match options.output {
        Some(output) => State::new(output),
        None => cipher::encrypt(key, input),
    };

    let ctx = AttackContext {
        input,
        output,
        key,
        leak_mask: State::new(options.knownkeybitmask),
    };

    println!("Input  : {}", ctx.input);
    println!("Output : {}", ctx.output);
    println!("Key    : {}", ctx.key);
    println!("KeyLeak: {}", ctx.leak_mask);

    let candidates = recover_key(&ctx);

    println!(
        "Computed keys: {}",
        candidates.keylist.iter().map(State::to_string).join(" ")
    );
    println!("Original key : {}", ctx.key);

    if let Some(path) = options.dump_keys {
        if let Err(err) = write_states(&path, &candidates.keylist) {
            eprintln!("Could not write {}: {}", path.display(), err);
            process::exit(1);
        }
    }
}
