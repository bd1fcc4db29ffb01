//! Word and paragraph vectors trained with lock-free parallel SGD.
//!
//! Supported architectures are CBOW, skip-gram, and the three paragraph-vector
//! models (PV-DM averaging, PV-DM concatenation, PV-DBOW), each with a
//! hierarchical-softmax output layer, a negative-sampling output layer, or both.
//!
//! The usual pipeline:
//!
//! 1. Build a [`Vocabulary`] from a token stream ([`Vocabulary::learn`]).
//! 2. Read the training text into a [`Corpus`] of vocabularized lines.
//! 3. Allocate a [`NeuralNet`] from the vocabulary and a [`TrainingConfig`].
//! 4. Call [`train`], then export the tables with [`NeuralNet::write_vectors`].

pub mod classes;
pub mod config;
pub mod corpus;
pub mod error;
pub mod huffman;
pub mod layer;
pub mod negative;
pub mod net;
pub mod rng;
pub mod text;
pub mod train;
pub mod vectors;
pub mod vocab;
pub mod window;

pub use config::{ModelType, TrainingConfig};
pub use corpus::{Corpus, Line};
pub use error::ConfigError;
pub use net::{ModelSnapshot, NeuralNet};
pub use train::{train, TrainingSummary};
pub use vectors::{VectorFormat, Vectors};
pub use vocab::{EntryKind, VocabEntry, Vocabulary};
pub use window::{Context, ContextWindow, WindowOptions};

/// Maximum length of a word, in bytes. Longer words are truncated.
pub const MAX_STRING: usize = 100;

/// Maximum number of words in a line. Longer lines are cut.
pub const MAX_SENTENCE_LENGTH: usize = 1000;

/// Maximum depth of the Huffman tree.
pub const MAX_CODE_LENGTH: usize = 40;

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

pub fn norm(v: &[real]) -> real {
    v.iter().copied().map(|e| e * e).sum::<real>().sqrt()
}

pub fn normalize(v: &mut [real]) {
    let len = norm(v);
    if len == 0.0 {
        return;
    }
    for e in v {
        *e /= len;
    }
}

pub fn dot(a: &[real], b: &[real]) -> real {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}
