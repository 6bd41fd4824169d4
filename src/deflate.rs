//! Deflate and inflate (Component B): flattening a forest's local
//! quadrants into the coordinate/level arrays the file container
//! stores, and reconstructing a rank's local forest from those arrays
//! plus a partition map.
//!
//! Grounded directly on `p4est_deflate_quadrants` and `p4est_inflate` in
//! the original source: deflate walks local trees in tree order and
//! appends each quadrant's integer coordinates and level (and, if
//! requested, its opaque payload); inflate walks the flat arrays back
//! into trees using the global partition map `gfq` to find this rank's
//! slice and a per-tree prefix-sum array `pertree` to find each
//! quadrant's owning tree.

use crate::codec::Dim;
use crate::error::{FileError, Result};
use crate::forest::{ForestInterface, InMemoryForest, Quadrant, TreeData, QMAXLEVEL};
use crate::partition::Partition;

/// Number of `i32` coordinate words per quadrant, not counting the
/// trailing level word: 2 for a 2-D quadrant, 3 for a 3-D octant.
fn coords_per_quadrant(dim: Dim) -> usize {
    match dim {
        Dim::Two => 2,
        Dim::Three => 3,
    }
}

/// Flatten a forest's locally-owned quadrants into a coordinate/level
/// array, and, if `want_payload`, the per-quadrant payload bytes
/// concatenated in the same order.
pub fn deflate(forest: &impl ForestInterface, want_payload: bool) -> Result<(Vec<i32>, Option<Vec<u8>>)> {
    let dim = forest.dim();
    let words_per_quadrant = coords_per_quadrant(dim) + 1;
    let mut coords = Vec::with_capacity(forest.local_num_quadrants() as usize * words_per_quadrant);
    let mut payload = want_payload.then(Vec::new);

    let first = forest.first_local_tree();
    let last = forest.last_local_tree();
    if first >= 0 {
        for tree_index in first..=last {
            let quadrants = forest.quadrants_in_tree(tree_index as usize);
            for q in quadrants {
                coords.push(q.x);
                coords.push(q.y);
                if let Some(z) = q.z {
                    coords.push(z);
                }
                coords.push(q.level);
            }
            if let Some(buf) = payload.as_mut() {
                match forest.payload_in_tree(tree_index as usize) {
                    Some(tree_payload) => buf.extend_from_slice(tree_payload),
                    None => {
                        let expected = quadrants.len() * forest.data_size();
                        if expected != 0 {
                            return Err(FileError::invariant(
                                "forest declares nonzero data_size but tree has no payload buffer",
                            ));
                        }
                    }
                }
            }
        }
    }
    Ok((coords, payload))
}

/// Reconstruct the quadrants owned by `rank` from the flat coordinate
/// array, using `gfq` to find this rank's global quadrant range and
/// `pertree` (length `num_trees + 1`, strictly nondecreasing, global
/// cumulative quadrant counts) to split that range across trees.
pub fn inflate(
    dim: Dim,
    num_trees: usize,
    gfq: &Partition,
    pertree: &[i64],
    rank: usize,
    coords: &[i32],
    payload: Option<&[u8]>,
    data_size: usize,
) -> Result<InMemoryForest> {
    if pertree.len() != num_trees + 1 {
        return Err(FileError::invariant(format!(
            "pertree has {} entries, expected {}",
            pertree.len(),
            num_trees + 1
        )));
    }
    if pertree.windows(2).any(|w| w[1] < w[0]) {
        return Err(FileError::invariant("pertree is not nondecreasing"));
    }
    if pertree[0] != 0 {
        return Err(FileError::invariant("pertree must start at 0"));
    }
    let total = *pertree.last().unwrap();
    if total != gfq.global_num_quadrants() {
        return Err(FileError::invariant(
            "pertree total disagrees with partition map's global quadrant count",
        ));
    }

    let words_per_quadrant = coords_per_quadrant(dim) + 1;
    let local_count = gfq.count_for_rank(rank);
    let global_start = gfq.as_slice()[rank];
    let global_end = global_start + local_count;

    let mut forest = InMemoryForest::empty(dim, num_trees, data_size);
    if local_count == 0 {
        return Ok(forest);
    }

    let expected_words = local_count as usize * words_per_quadrant;
    if coords.len() != expected_words {
        return Err(FileError::count(expected_words * 4, coords.len() * 4));
    }
    if let Some(buf) = payload {
        let expected_bytes = local_count as usize * data_size;
        if buf.len() != expected_bytes {
            return Err(FileError::count(expected_bytes, buf.len()));
        }
    }

    // Binary search pertree for the first and last tree this rank touches.
    let first_tree = pertree.partition_point(|&c| c <= global_start).saturating_sub(1);
    let last_tree = pertree.partition_point(|&c| c < global_end).saturating_sub(1);
    forest.first_local_tree = first_tree as i64;
    forest.last_local_tree = last_tree as i64;

    let mut word_cursor = 0usize;
    let mut payload_cursor = 0usize;
    let mut global_quadrant = global_start;

    for tree_index in first_tree..=last_tree {
        let tree_start = pertree[tree_index].max(global_start);
        let tree_end = pertree[tree_index + 1].min(global_end);
        let tree_remain = (tree_end - tree_start) as usize;

        let mut tree_data = TreeData {
            quadrants: Vec::with_capacity(tree_remain),
            quadrants_per_level: vec![0i64; QMAXLEVEL as usize + 1],
            maxlevel: -1,
            first_descendant: None,
            last_descendant: None,
        };
        let mut tree_payload = data_size.ne(&0).then(|| Vec::with_capacity(tree_remain * data_size));

        for _ in 0..tree_remain {
            let x = coords[word_cursor];
            let y = coords[word_cursor + 1];
            let (z, level) = match dim {
                Dim::Two => (None, coords[word_cursor + 2]),
                Dim::Three => (Some(coords[word_cursor + 2]), coords[word_cursor + 3]),
            };
            word_cursor += words_per_quadrant;

            if !(0..=QMAXLEVEL).contains(&level) {
                return Err(FileError::format(format!("quadrant level {level} out of range")));
            }
            let q = Quadrant { x, y, z, level };
            tree_data.quadrants_per_level[level as usize] += 1;
            tree_data.maxlevel = tree_data.maxlevel.max(level);
            tree_data.quadrants.push(q);

            if let (Some(buf), Some(src)) = (tree_payload.as_mut(), payload) {
                buf.extend_from_slice(&src[payload_cursor..payload_cursor + data_size]);
            }
            payload_cursor += data_size;
            global_quadrant += 1;
        }

        if let (Some(first), Some(last)) = (tree_data.quadrants.first(), tree_data.quadrants.last()) {
            tree_data.first_descendant = Some(first.first_descendant(QMAXLEVEL));
            tree_data.last_descendant = Some(last.last_descendant(QMAXLEVEL));
        }

        forest.trees[tree_index] = tree_data;
        forest.payloads[tree_index] = tree_payload;
    }
    debug_assert_eq!(global_quadrant, global_end);

    // A freshly inflated forest starts at revision 0 (spec §4.B). This
    // rank's fragment of the global_first_position array is its own
    // first owned quadrant at maximum refinement; assembling the full
    // per-rank array is the partition-wide exchange the host forest
    // module performs, not this function (see the field doc comment).
    forest.revision = 0;
    forest.global_first_position = forest.trees[first_tree].quadrants.first().map(|q| q.first_descendant(QMAXLEVEL));

    Ok(forest)
}
