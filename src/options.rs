//! Command-line options for the attack driver.

use std::num::ParseIntError;
use std::path::PathBuf;

/// Accepts decimal or 0x-prefixed hexadecimal.
fn parse_word(s: &str) -> Result<u64, ParseIntError> {
    if s.starts_with("0x") || s.starts_with("0X") {
        u64::from_str_radix(&s[2..], 16)
    } else {
        s.parse()
    }
}

#[derive(Clone, StructOpt)]
#[structopt(
    name = "sbtcrack",
    about = "Meet-in-the-middle key recovery against the SBT block cipher."
)]
pub struct AttackOptions {
    #[structopt(short = "i", long = "input", parse(try_from_str = "parse_word"))]
    /**
    The known plaintext block (the cipher's LFSR fill) as a 64-bit integer,
    decimal or 0x-prefixed hexadecimal.
    */
    pub input: Option<u64>,

    #[structopt(short = "k", long = "key", parse(try_from_str = "parse_word"))]
    /**
    The true 56-bit key. Used to compute the output block when --output is
    omitted, and to resolve --knownkeybitmask.
    */
    pub key: Option<u64>,

    #[structopt(short = "o", long = "output", parse(try_from_str = "parse_word"))]
    /**
    The known ciphertext block. Computed from --key when omitted.
    */
    pub output: Option<u64>,

    #[structopt(
        long = "knownkeybitmask",
        default_value = "0",
        parse(try_from_str = "parse_word")
    )]
    /**
    Mask of key bits assumed leaked; candidate keys disagreeing with the true
    key on these bits are pruned.
    */
    pub knownkeybitmask: u64,

    #[structopt(long = "dump-keys", parse(from_os_str))]
    /**
    Write the final candidate key list to this file as 8-byte little-endian
    words.
    */
    pub dump_keys: Option<PathBuf>,
}
