//! Configuration errors.
//!
//! Everything here is a defect in how the trainer was set up, not a runtime
//! condition: callers are expected to report it and stop. I/O failures travel
//! separately as `anyhow::Error`.

use crate::config::ModelType;
use crate::window::CONTEXT_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unrecognized model type {0:?} (expected cbow, skipgram, pvdm, pvdm-concat or pvdbow)")]
    UnknownModel(String),

    #[error("embedding dimension must be at least 1")]
    ZeroDimension,

    #[error("number of epochs must be at least 1")]
    ZeroEpochs,

    #[error("number of worker threads must be at least 1")]
    ZeroThreads,

    #[error("no output layer: enable hierarchical softmax or set negative > 0")]
    NoOutputLayer,

    #[error("negative sampling table must have at least one slot")]
    EmptyNegativeTable,

    #[error("window of {before} before and {after} after needs {needed} slots; capacity is {CONTEXT_CAPACITY}")]
    WindowTooLarge {
        before: usize,
        after: usize,
        needed: usize,
    },

    #[error("randomized window needs before and after of at least 1")]
    EmptyRandomWindow,

    #[error("symmetric window needs before == after (got {before} and {after})")]
    AsymmetricWindow { before: usize, after: usize },

    #[error("prepad and prepad-paragraph-once are mutually exclusive")]
    ConflictingPadding,

    #[error("prepad-paragraph-once is only meaningful for paragraph models")]
    ParagraphPaddingWithoutParagraphs,

    #[error("model {model} needs paragraph_mode = {expected} in its window options")]
    ParagraphModeMismatch { model: ModelType, expected: bool },

    #[error("{0}")]
    ConcatWindow(&'static str),

    #[error("start symbol {index} is outside the vocabulary of {len} entries")]
    StartSymbolOutOfRange { index: u32, len: usize },

    #[error("vocabulary must be sorted and Huffman-encoded before training")]
    VocabularyNotFrozen,

    #[error("vocabulary needs at least one entry")]
    EmptyVocabulary,

    #[error("corpus has {lines} lines but the network was built for {paragraphs} paragraphs")]
    ParagraphCountMismatch { lines: usize, paragraphs: usize },
}
