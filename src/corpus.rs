//! Vocabularized training data.

use std::io::Read;
use std::ops::Range;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::text::{read_tokens, Token};
use crate::vocab::{Vocabulary, UNKNOWN};
use crate::MAX_SENTENCE_LENGTH;

/// One line of the corpus. In paragraph models it is one paragraph, and `id`
/// is its row in the paragraph table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub id: u32,
    pub words: Vec<u32>,
}

impl Line {
    /// Lines of length 0 are skipped by training.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    lines: Vec<Line>,
    total_words: u64,
    truncated_lines: usize,
    unknown_words: u64,
}

impl Corpus {
    /// Build a corpus from lines of vocabulary indices. Line ids are their
    /// positions.
    pub fn from_lines(lines: Vec<Vec<u32>>) -> Self {
        let mut corpus = Corpus::default();
        for words in lines {
            corpus.push(words);
        }
        corpus
    }

    fn push(&mut self, mut words: Vec<u32>) {
        if words.len() > MAX_SENTENCE_LENGTH {
            words.truncate(MAX_SENTENCE_LENGTH);
            self.truncated_lines += 1;
        }
        self.total_words += words.len() as u64;
        self.lines.push(Line {
            id: self.lines.len() as u32,
            words,
        });
    }

    /// Read text with one paragraph per line. Words missing from `vocab` are
    /// replaced by `<unk>` if the vocabulary has it, and dropped otherwise.
    /// Lines longer than [`MAX_SENTENCE_LENGTH`] words are cut short.
    pub fn from_reader<R: Read>(reader: R, vocab: &Vocabulary) -> Result<Self> {
        let unknown = vocab.index_of(UNKNOWN).map(|i| i as u32);
        let mut corpus = Corpus::default();
        let mut words = vec![];
        for token in read_tokens(reader) {
            let token = token.context("error reading training data")?;
            match token {
                Token::EndOfLine => corpus.push(std::mem::take(&mut words)),
                Token::Word(w) | Token::Truncated(w) => {
                    match vocab.index_of(&w).map(|i| i as u32).or(unknown) {
                        Some(i) => words.push(i),
                        None => corpus.unknown_words += 1,
                    }
                }
            }
        }
        if !words.is_empty() {
            corpus.push(words);
        }

        if corpus.truncated_lines > 0 {
            warn!(
                "{} lines were longer than {MAX_SENTENCE_LENGTH} words and were cut short",
                corpus.truncated_lines
            );
        }
        info!(
            "Corpus: {} lines, {} words ({} out-of-vocabulary words dropped)",
            corpus.lines.len(),
            corpus.total_words,
            corpus.unknown_words
        );
        Ok(corpus)
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of words across all lines, after truncation.
    pub fn total_words(&self) -> u64 {
        self.total_words
    }

    pub fn truncated_lines(&self) -> usize {
        self.truncated_lines
    }

    pub fn unknown_words(&self) -> u64 {
        self.unknown_words
    }

    /// Split the lines into `n` contiguous ranges of nearly equal line count.
    pub fn partitions(&self, n: usize) -> Vec<Range<usize>> {
        let len = self.lines.len();
        (0..n).map(|i| len * i / n..len * (i + 1) / n).collect()
    }
}
