//! Progress reporting and binary state-vector files.

use std::convert::TryInto;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::state::State;

/// Command-line progress track for the candidate searches.
///
/// The subset enumerations run into millions of candidates per worker, so
/// the track advances once per fixed slice of the total rather than per
/// candidate: `tick` is a counter bump and one integer comparison until a
/// slice boundary is crossed.
pub struct SearchProgress {
    done: usize,
    total: usize,
    printed: usize,
}

/// Width of a finished track in tick marks.
const TICKS: usize = 50;

impl SearchProgress {
    /// Creates a track covering `total` candidates.
    pub fn new(total: usize) -> SearchProgress {
        SearchProgress {
            done: 0,
            total,
            printed: 0,
        }
    }

    /// Counts one candidate, printing a mark per completed slice.
    #[inline(always)]
    pub fn tick(&mut self) {
        self.done += 1;

        while self.printed < TICKS && self.done * TICKS >= (self.printed + 1) * self.total {
            print!("=");
            io::stdout().flush().expect("Could not flush stdout");
            self.printed += 1;
        }
    }
}

impl Drop for SearchProgress {
    fn drop(&mut self) {
        if self.printed > 0 {
            println!();
        }
    }
}

/// Writes a vector of states as consecutive 8-byte little-endian words.
pub fn write_states<P: AsRef<Path>>(path: P, states: &[State]) -> io::Result<()> {
    let mut file = File::create(path)?;
    for state in states {
        file.write_all(&state.to_u64().to_le_bytes())?;
    }
    Ok(())
}

/// Reads a vector of states written by `write_states`. A file whose length
/// is not a multiple of the state size is rejected.
pub fn read_states<P: AsRef<Path>>(path: P) -> io::Result<Vec<State>> {
    let mut bytes = vec![];
    File::open(path)?.read_to_end(&mut bytes)?;

    if bytes.len() % 8 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "file size is not a multiple of the state size",
        ));
    }

    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| State::new(u64::from_le_bytes(chunk.try_into().unwrap())))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{read_states, write_states};
    use crate::state::State;
    use std::fs;
    use std::io::ErrorKind;

    #[test]
    fn state_vectors_round_trip() {
        let path = std::env::temp_dir().join("sbtcrack_state_vector_test");
        let states: Vec<State> = [0, 1, 0xFFFF_FFFF_FFFF_FFFF, 0x0123_4567_89AB_CDEF]
            .iter()
            .map(|&x| State::new(x))
            .collect();

        write_states(&path, &states).unwrap();
        assert_eq!(read_states(&path).unwrap(), states);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncated_files_are_rejected() {
        let path = std::env::temp_dir().join("sbtcrack_truncated_vector_test");
        fs::write(&path, [0u8; 12]).unwrap();

        let err = read_states(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        fs::remove_file(&path).unwrap();
    }
}
