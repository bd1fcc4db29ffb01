//! The network: vocabulary, hyperparameters and weight matrices.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::AtomicU64;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::error::ConfigError;
use crate::layer::LookupLayer;
use crate::negative::NegativeTable;
use crate::real;
use crate::rng::{Rng, SharedRng};
use crate::vectors::{write_rows, VectorFormat};
use crate::vocab::{VocabEntry, Vocabulary};

pub const EXP_TABLE_SIZE: usize = 1000;
pub const MAX_EXP: real = 6.0;

/// Label of paragraph row `row` in exports.
pub fn paragraph_label(row: usize) -> String {
    format!("*_{row}")
}

pub struct NeuralNet {
    vocab: Vocabulary,
    config: TrainingConfig,
    num_paragraphs: usize,
    /// The learned word vectors, `vocab.len() x dim`.
    pub(crate) words: LookupLayer,
    /// The learned paragraph vectors, `num_paragraphs x dim`. Empty for word
    /// models.
    pub(crate) paragraphs: LookupLayer,
    /// Weights for hierarchical softmax predictors, one row per internal
    /// Huffman node.
    pub(crate) hs: LookupLayer,
    /// Output rows for negative sampling, one per vocabulary entry.
    pub(crate) neg: LookupLayer,
    pub(crate) table: Option<NegativeTable>,
    exp_table: Vec<real>,
    /// Window sizes for every worker are drawn from here.
    pub(crate) window_rng: SharedRng,
    /// Words read so far by all workers, summed over epochs.
    pub(crate) words_processed: AtomicU64,
}

impl NeuralNet {
    /// Allocate and initialize the network.
    ///
    /// `vocab` must be sorted and Huffman-encoded. `num_paragraphs` is the
    /// number of lines in the corpus for paragraph models and is ignored for
    /// word models. Input tables start with small random weights drawn with
    /// `config.seed`; output tables start at zero.
    pub fn new(
        vocab: Vocabulary,
        config: TrainingConfig,
        num_paragraphs: usize,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if vocab.is_empty() {
            return Err(ConfigError::EmptyVocabulary);
        }
        if !vocab.is_encoded() {
            return Err(ConfigError::VocabularyNotFrozen);
        }
        if config.window.start_symbol as usize >= vocab.len() {
            return Err(ConfigError::StartSymbolOutOfRange {
                index: config.window.start_symbol,
                len: vocab.len(),
            });
        }

        let vocab_size = vocab.len();
        let dim = config.dim;
        let hidden = config.hidden_size();
        let num_paragraphs = if config.model.is_paragraph() {
            num_paragraphs
        } else {
            0
        };

        let mut rng = Rng(config.seed);
        let words = LookupLayer::random(vocab_size, dim, &mut rng);
        let paragraphs = LookupLayer::random(num_paragraphs, dim, &mut rng);
        let hs = if config.hs {
            LookupLayer::zeros(vocab_size.saturating_sub(1), hidden)
        } else {
            LookupLayer::zeros(0, hidden)
        };
        let (neg, table) = if config.negative > 0 {
            let counts: Vec<u64> = vocab.entries().iter().map(|e| e.count).collect();
            (
                LookupLayer::zeros(vocab_size, hidden),
                Some(NegativeTable::new(&counts, config.negative_table_size)),
            )
        } else {
            (LookupLayer::zeros(0, hidden), None)
        };

        let exp_table = (0..EXP_TABLE_SIZE)
            .map(|i| {
                let j = (i as real / EXP_TABLE_SIZE as real * 2.0 - 1.0) * MAX_EXP;
                let e = (j as f64).exp() as f32; // Precompute the exp() table
                e / (e + 1.0) // Precompute f(x) = x / (x + 1)
            })
            .collect();

        info!(
            "Network: {} model, {} words, {} paragraphs, dim {}, hidden {}",
            config.model, vocab_size, num_paragraphs, dim, hidden
        );
        let window_rng = SharedRng::new(config.seed);
        Ok(NeuralNet {
            vocab,
            config,
            num_paragraphs,
            words,
            paragraphs,
            hs,
            neg,
            table,
            exp_table,
            window_rng,
            words_processed: AtomicU64::new(0),
        })
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn num_paragraphs(&self) -> usize {
        self.num_paragraphs
    }

    pub fn words(&self) -> &LookupLayer {
        &self.words
    }

    pub fn paragraphs(&self) -> &LookupLayer {
        &self.paragraphs
    }

    pub fn hs_weights(&self) -> &LookupLayer {
        &self.hs
    }

    pub fn neg_weights(&self) -> &LookupLayer {
        &self.neg
    }

    /// Approximate the logistic function, 1 / (1 + e^-x), saturating to 0 and
    /// 1 outside `[-MAX_EXP, MAX_EXP]`.
    pub fn sigmoid(&self, x: real) -> real {
        if x >= MAX_EXP {
            1.0
        } else if x <= -MAX_EXP {
            0.0
        } else {
            let i = ((x + MAX_EXP) * (EXP_TABLE_SIZE as real / MAX_EXP / 2.0)) as usize;
            self.exp_table[i.min(EXP_TABLE_SIZE - 1)]
        }
    }

    /// Write the word rows, then the paragraph rows labelled `*_<row>`.
    pub fn write_vectors<W: Write>(&self, out: W, format: VectorFormat) -> Result<()> {
        let words = self.words.to_vec();
        let paragraphs = self.paragraphs.to_vec();
        let dim = self.config.dim;
        let labels: Vec<String> = (0..self.num_paragraphs).map(paragraph_label).collect();
        let word_rows = self
            .vocab
            .entries()
            .iter()
            .zip(words.chunks_exact(dim))
            .map(|(vw, row)| (vw.word.as_str(), row));
        let paragraph_rows = labels
            .iter()
            .zip(paragraphs.chunks_exact(dim))
            .map(|(label, row)| (label.as_str(), row));
        write_rows(
            out,
            format,
            self.vocab.len() + self.num_paragraphs,
            dim,
            word_rows.chain(paragraph_rows),
        )
    }

    pub fn save_vectors(&self, output_file: &Path, format: VectorFormat) -> Result<()> {
        let fo = BufWriter::new(
            File::create(output_file)
                .with_context(|| format!("error creating output file {}", output_file.display()))?,
        );
        self.write_vectors(fo, format)
    }

    /// Copy everything needed to evaluate the trained model.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            config: self.config.clone(),
            vocab: self.vocab.entries().to_vec(),
            words: self.words.to_vec(),
            paragraphs: self.paragraphs.to_vec(),
            hs: self.hs.to_vec(),
            neg: self.neg.to_vec(),
        }
    }
}

impl std::fmt::Debug for NeuralNet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeuralNet")
            .field("config", &self.config)
            .field("vocab_size", &self.vocab.len())
            .field("num_paragraphs", &self.num_paragraphs)
            .finish_non_exhaustive()
    }
}

/// A trained model in plain vectors, saved with bincode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub config: TrainingConfig,
    pub vocab: Vec<VocabEntry>,
    pub words: Vec<real>,
    pub paragraphs: Vec<real>,
    pub hs: Vec<real>,
    pub neg: Vec<real>,
}

fn sigmoid(x: real) -> real {
    1.0 / (1.0 + (-x).exp())
}

impl ModelSnapshot {
    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        bincode::serialize_into(out, self).context("error writing model")
    }

    pub fn read_from<R: Read>(input: R) -> Result<Self> {
        bincode::deserialize_from(input).context("error reading model")
    }

    pub fn save(&self, filename: &Path) -> Result<()> {
        let f = BufWriter::new(
            File::create(filename)
                .with_context(|| format!("failed to create model file {filename:?}"))?,
        );
        self.write_to(f)
    }

    pub fn load(filename: &Path) -> Result<Self> {
        let f = BufReader::new(
            File::open(filename)
                .with_context(|| format!("failed to open model file {filename:?}"))?,
        );
        Self::read_from(f).with_context(|| format!("failed to load model from file {filename:?}"))
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn word_vector(&self, i: usize) -> &[real] {
        let size = self.dim();
        &self.words[i * size..][..size]
    }

    pub fn paragraph_vector(&self, i: usize) -> &[real] {
        let size = self.dim();
        &self.paragraphs[i * size..][..size]
    }

    /// Estimate P(b | input) with the hierarchical softmax tree. `input` must
    /// have the width of the hidden layer.
    ///
    /// # Panics
    ///
    /// If the model was trained without hierarchical softmax.
    pub fn predict_from(&self, input: &[real], b: usize) -> real {
        assert!(self.config.hs, "model has no hierarchical softmax layer");
        let size = self.config.hidden_size();
        assert_eq!(input.len(), size);
        let entry = &self.vocab[b];
        assert_eq!(entry.points.len(), entry.code.len());
        let mut p: real = 1.0;
        for (&node, &dir) in entry.points.iter().zip(entry.code.iter()) {
            let sign = if dir == 0 { 1.0 } else { -1.0 };
            p *= sigmoid(sign * crate::dot(input, &self.hs[node as usize * size..][..size]));
        }
        p
    }

    /// Estimate P(b | a), the probability that a word in the context of `a`
    /// is `b`.
    pub fn predict(&self, a: usize, b: usize) -> real {
        self.predict_from(self.word_vector(a), b)
    }
}
