//! In-process simulation of an MPI-style rank group (Component E).
//!
//! There is no MPI dependency in this workspace, so a collective
//! operation is modeled as fanning an `FnMut(rank) -> Result<T>` closure
//! out over `size` simulated ranks with `rayon`, then performing the
//! same "any rank's error wins" reduction a real `sc_io_write_at_all`
//! implementation would perform after an `MPI_Allreduce` on error codes:
//! grounded on the rank-dependent write-offset formula and the
//! collective error broadcast in `p4est_file_write_field` /
//! `p4est_file_open_create`.

use rayon::prelude::*;

use crate::error::{FileError, Result};

/// A simulated collective communicator: `size` ranks, one of them
/// designated rank 0 for the operations the file format treats as
/// rank-0-local (writing headers, truncating, computing file size).
#[derive(Debug, Clone, Copy)]
pub struct Communicator {
    size: usize,
}

impl Communicator {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(FileError::invariant("communicator must have at least one rank"));
        }
        Ok(Communicator { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn rank_zero(&self) -> usize {
        0
    }

    /// Run `op` once per rank, in parallel, and apply the collective
    /// error semantics the format's write/read paths rely on: if any
    /// rank failed, every rank observes an error (the first one found,
    /// by rank order, for determinism), exactly as if the real error
    /// code had been `MPI_Allreduce`-maxed across the group.
    pub fn collective_check<T, F>(&self, op: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let results: Vec<Result<T>> = (0..self.size).into_par_iter().map(op).collect();
        if let Some(rank) = results.iter().position(Result::is_err) {
            let err = match results.into_iter().nth(rank).unwrap() {
                Err(e) => e,
                Ok(_) => unreachable!(),
            };
            return Err(err);
        }
        Ok(results.into_iter().map(|r| r.unwrap()).collect())
    }
}
