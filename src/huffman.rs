//! Huffman coding for hierarchical softmax.
//!
//! Every vocabulary entry is a leaf of a binary tree built from the word
//! counts. Predicting a word means making one binary decision at each internal
//! node on the way from the root down to its leaf, so frequent words (short
//! codes) are cheap to train.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::MAX_CODE_LENGTH;

pub type Code = SmallVec<[u8; MAX_CODE_LENGTH]>;
pub type Points = SmallVec<[u32; MAX_CODE_LENGTH]>;

/// Path from the root of the tree to one leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuffmanPath {
    /// `code[d]` is the branch (0 or 1) taken at depth `d`.
    pub code: Code,
    /// `points[d]` is the internal node visited at depth `d`, numbered
    /// `0..len - 1`. The root is always `len - 2`.
    pub points: Points,
}

/// Build the tree for leaves with the given counts.
///
/// `counts` should be sorted in descending order (entries pinned out of order
/// still get a valid, if slightly longer, code). The result has one path per
/// leaf, in the same order.
///
/// # Panics
///
/// If any code would be longer than [`MAX_CODE_LENGTH`].
pub fn build_paths(counts: &[u64]) -> Vec<HuffmanPath> {
    let vocab_size = counts.len();
    if vocab_size < 2 {
        return vec![HuffmanPath::default(); vocab_size];
    }

    // Slots 0..vocab_size are leaves; internal nodes are appended after them.
    let mut count = vec![u64::MAX / 2; vocab_size * 2 + 1];
    let mut branch = vec![0u8; vocab_size * 2 + 1];
    let mut parent = vec![0usize; vocab_size * 2 + 1];
    count[..vocab_size].copy_from_slice(counts);

    // Two sorted queues: unused leaves are `count[..leaf]`, smallest last,
    // and unused internal nodes are `count[node..]`, smallest first.
    let mut leaf = vocab_size;
    let mut node = vocab_size;
    for new_node in vocab_size..(vocab_size * 2 - 1) {
        let left = take_smallest(&count, &mut leaf, &mut node);
        let right = take_smallest(&count, &mut leaf, &mut node);
        count[new_node] = count[left].saturating_add(count[right]);
        parent[left] = new_node;
        parent[right] = new_node;
        branch[right] = 1;
    }

    let root = vocab_size * 2 - 2;
    (0..vocab_size)
        .map(|leaf| {
            let mut path = HuffmanPath::default();
            let mut b = leaf;
            while b != root {
                assert!(
                    path.code.len() < MAX_CODE_LENGTH,
                    "Huffman code for leaf {leaf} exceeds {MAX_CODE_LENGTH} bits"
                );
                path.code.push(branch[b]);
                b = parent[b];
                path.points.push((b - vocab_size) as u32);
            }
            path.code.reverse();
            path.points.reverse();
            path
        })
        .collect()
}

/// Pop whichever queue head has the smaller count. Ties go to the internal
/// node.
fn take_smallest(count: &[u64], leaf: &mut usize, node: &mut usize) -> usize {
    if *leaf > 0 && count[*leaf - 1] < count[*node] {
        *leaf -= 1;
        *leaf
    } else {
        *node += 1;
        *node - 1
    }
}
