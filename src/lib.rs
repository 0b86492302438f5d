//! sbtcrack recovers 56-bit SBT keys from a known plaintext/ciphertext pair
//! using a meet-in-the-middle attack over byte paths.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate smallvec;
#[macro_use]
extern crate structopt_derive;

extern crate crossbeam_utils;
extern crate fnv;
extern crate itertools;
extern crate num_cpus;
extern crate structopt;
extern crate time;

pub mod attack;
pub mod cipher;
pub mod keymask;
pub mod keystream;
pub mod mitm;
pub mod options;
pub mod state;
pub mod utility;
