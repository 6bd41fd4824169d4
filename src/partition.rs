//! Global partition map (Component B support): `gfq`, the strictly
//! nondecreasing array of length `P+1` giving, for every simulated rank,
//! the index of the first quadrant it owns in global numbering (with
//! `gfq[P]` equal to the total quadrant count).
//!
//! Grounded on `p4est_file_context`'s `global_first_quadrant` /
//! `gfq_owned` pair: a context either borrows a partition map that
//! outlives it (the common case, owned by the forest) or allocates and
//! owns one itself (built by `p4est_file_open_read_ext` from a uniform
//! guess when the caller passes none).

use crate::error::FileError;

/// A global partition map, either borrowed from the forest that owns it
/// or synthesized and owned by the file context itself.
#[derive(Debug, Clone)]
pub enum Partition {
    Borrowed(std::sync::Arc<Vec<i64>>),
    Owned(Vec<i64>),
}

impl Partition {
    pub fn as_slice(&self) -> &[i64] {
        match self {
            Partition::Borrowed(v) => v,
            Partition::Owned(v) => v,
        }
    }

    pub fn num_ranks(&self) -> usize {
        self.as_slice().len().saturating_sub(1)
    }

    pub fn global_num_quadrants(&self) -> i64 {
        *self.as_slice().last().unwrap_or(&0)
    }

    /// `gfq` must have exactly `num_ranks + 1` entries, be nondecreasing,
    /// and start at zero.
    pub fn validate(&self, num_ranks: usize) -> Result<(), FileError> {
        let gfq = self.as_slice();
        if gfq.len() != num_ranks + 1 {
            return Err(FileError::invariant(format!(
                "partition map has {} entries, expected {}",
                gfq.len(),
                num_ranks + 1
            )));
        }
        if gfq[0] != 0 {
            return Err(FileError::invariant("partition map must start at 0"));
        }
        if gfq.windows(2).any(|w| w[1] < w[0]) {
            return Err(FileError::invariant("partition map is not nondecreasing"));
        }
        Ok(())
    }

    /// Build a uniform partition map over `num_ranks` ranks for
    /// `global_num_quadrants` quadrants, used when `open_read` is given
    /// no existing forest to borrow one from. Each boundary is the floor
    /// cut `gfq[r] = (r * N) / P`, matching `p4est_comm_global_first_quadrant`
    /// (`p4est_partition_cut_gloidx` in the original source) exactly, so a
    /// reader that synthesizes this partition splits a field's payload
    /// the same way any other faithful implementation would.
    pub fn uniform(num_ranks: usize, global_num_quadrants: i64) -> Self {
        let gfq = (0..=num_ranks)
            .map(|rank| (rank as i64 * global_num_quadrants) / num_ranks as i64)
            .collect();
        Partition::Owned(gfq)
    }

    /// Number of quadrants owned by `rank`.
    pub fn count_for_rank(&self, rank: usize) -> i64 {
        let gfq = self.as_slice();
        gfq[rank + 1] - gfq[rank]
    }

    /// Find the rank owning global quadrant index `q` via binary search
    /// over the partition boundaries (mirrors `sc_bsearch_range` as used
    /// by `p4est_inflate`).
    pub fn rank_of(&self, q: i64) -> Option<usize> {
        let gfq = self.as_slice();
        if q < 0 || q >= self.global_num_quadrants() {
            return None;
        }
        match gfq.binary_search(&q) {
            Ok(idx) => {
                // q equals a boundary; it belongs to the rank that starts there,
                // unless that rank is empty, in which case scan forward.
                let mut rank = idx;
                while rank + 1 < gfq.len() && gfq[rank] == gfq[rank + 1] {
                    rank += 1;
                }
                Some(rank)
            }
            Err(idx) => Some(idx - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_partition_sums_to_total() {
        let p = Partition::uniform(3, 10);
        assert_eq!(p.global_num_quadrants(), 10);
        assert!(p.validate(3).is_ok());
        let counts: Vec<i64> = (0..3).map(|r| p.count_for_rank(r)).collect();
        assert_eq!(counts.iter().sum::<i64>(), 10);
    }

    #[test]
    fn validate_rejects_non_monotone() {
        let p = Partition::Owned(vec![0, 5, 3, 10]);
        assert!(p.validate(3).is_err());
    }

    #[test]
    fn validate_rejects_nonzero_start() {
        let p = Partition::Owned(vec![1, 5, 10]);
        assert!(p.validate(2).is_err());
    }

    #[test]
    fn rank_of_handles_boundaries_and_empty_ranks() {
        // rank 1 is empty
        let p = Partition::Owned(vec![0, 4, 4, 10]);
        assert_eq!(p.rank_of(0), Some(0));
        assert_eq!(p.rank_of(3), Some(0));
        assert_eq!(p.rank_of(4), Some(2));
        assert_eq!(p.rank_of(9), Some(2));
        assert_eq!(p.rank_of(10), None);
        assert_eq!(p.rank_of(-1), None);
    }
}
