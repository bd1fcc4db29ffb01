//! Vocabulary construction.
//!
//! A [`Vocabulary`] is built in two stages. While counting, the only state is
//! a map from word to tally. [`Vocabulary::sort`] then derives the
//! index-ordered view (dense indices `0..len`), and
//! [`Vocabulary::encode_huffman`] fills in the codes. Any later mutation makes
//! the view stale again until the next sort.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::ops::Index;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::huffman::{self, Code, Points};
use crate::text::{Token, END_OF_LINE};

/// Placeholder that rare words can be folded into.
pub const UNKNOWN: &str = "<unk>";

/// Tokens starting with this are class labels rather than text.
pub const LABEL_PREFIX: &str = "__label__";

/// Counting stops to prune rare words whenever the table grows past this.
/// (30M hash slots at a 0.7 load factor.)
pub const PRUNE_LIMIT: usize = 21_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Word,
    /// Markers such as `</s>` and `<unk>`. Sorted ahead of every other entry
    /// and never pruned.
    Special,
    /// Single-character units. [`classify`](Self::classify) never produces
    /// this kind; callers building character vocabularies add these entries
    /// with [`Vocabulary::add_count`]. They are pruned like words.
    Char,
    Label,
}

impl EntryKind {
    pub fn classify(token: &str) -> EntryKind {
        if token == END_OF_LINE || token == UNKNOWN {
            EntryKind::Special
        } else if token.starts_with(LABEL_PREFIX) {
            EntryKind::Label
        } else {
            EntryKind::Word
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub word: String,
    pub kind: EntryKind,
    pub index: usize,
    pub count: u64,
    /// Huffman code, one branch per tree level. Empty until encoded.
    pub code: Code,
    /// Internal tree nodes from the root down to this entry's parent.
    pub points: Points,
}

impl VocabEntry {
    pub fn is_special(&self) -> bool {
        self.kind == EntryKind::Special
    }
}

#[derive(Debug, Clone)]
struct Tally {
    kind: EntryKind,
    count: u64,
    /// Insertion order; breaks ties when sorting.
    seq: u64,
    /// Position in the sorted view, if it is current.
    index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Counting,
    Sorted,
    Encoded,
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    tallies: HashMap<String, Tally>,
    next_seq: u64,
    /// Derived from `tallies` by `sort`; empty while counting.
    sorted: Vec<VocabEntry>,
    stage: Stage,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary {
            tallies: HashMap::new(),
            next_seq: 0,
            sorted: vec![],
            stage: Stage::Counting,
        }
    }
}

impl Vocabulary {
    /// An empty vocabulary holding only the end-of-line marker, which will
    /// sort to index 0.
    pub fn new() -> Self {
        let mut vocab = Vocabulary::default();
        vocab.add_count(END_OF_LINE, EntryKind::Special, 0);
        vocab
    }

    /// Build a vocabulary from `(word, count)` pairs, classifying each word.
    /// The result is not sorted yet.
    pub fn from_counts<'a, I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut vocab = Vocabulary::default();
        for (word, count) in counts {
            vocab.add_count(word, EntryKind::classify(word), count);
        }
        vocab
    }

    /// Adds one occurrence of a token.
    pub fn add(&mut self, word: &str) {
        self.add_count(word, EntryKind::classify(word), 1);
    }

    /// Adds `n` occurrences. If the word is already present its kind is kept.
    pub fn add_count(&mut self, word: &str, kind: EntryKind, n: u64) {
        self.invalidate();
        if let Some(tally) = self.tallies.get_mut(word) {
            tally.count += n;
            return;
        }
        self.tallies.insert(
            word.to_string(),
            Tally {
                kind,
                count: n,
                seq: self.next_seq,
                index: None,
            },
        );
        self.next_seq += 1;
    }

    /// Adds all of `other`'s counts to this vocabulary. Words new to `self`
    /// are inserted in `other`'s insertion order.
    pub fn merge(&mut self, other: &Vocabulary) {
        let mut incoming: Vec<(&String, &Tally)> = other.tallies.iter().collect();
        incoming.sort_by_key(|(_, t)| t.seq);
        for (word, tally) in incoming {
            self.add_count(word, tally.kind, tally.count);
        }
    }

    /// Drops every non-special entry with fewer than `min_count` occurrences
    /// and returns how many were dropped. With `fold_unknown`, their counts
    /// are added to the [`UNKNOWN`] entry, creating it if needed.
    pub fn reduce(&mut self, min_count: u64, fold_unknown: bool) -> usize {
        self.invalidate();
        let before = self.tallies.len();
        let mut folded = 0;
        self.tallies.retain(|_, t| {
            let keep = t.kind == EntryKind::Special || t.count >= min_count;
            if !keep {
                folded += t.count;
            }
            keep
        });
        let dropped = before - self.tallies.len();
        if fold_unknown && folded > 0 {
            self.add_count(UNKNOWN, EntryKind::Special, folded);
        }
        dropped
    }

    /// Reduces the vocabulary by removing infrequent tokens. Each call raises
    /// the threshold by one.
    fn prune(&mut self, min_reduce: &mut u64) {
        let threshold = *min_reduce;
        self.invalidate();
        self.tallies
            .retain(|_, t| t.kind == EntryKind::Special || t.count > threshold);
        *min_reduce += 1;
        debug!(
            "pruned vocabulary to {} entries (threshold {threshold})",
            self.tallies.len()
        );
    }

    /// Sorts the vocabulary by frequency and assigns dense indices.
    ///
    /// Special entries come first, in insertion order. Everything else is in
    /// descending order of count, ties broken by insertion order.
    pub fn sort(&mut self) {
        let mut order: Vec<(&String, &mut Tally)> = self.tallies.iter_mut().collect();
        order.sort_by(|(_, a), (_, b)| {
            let a_special = a.kind == EntryKind::Special;
            let b_special = b.kind == EntryKind::Special;
            b_special
                .cmp(&a_special)
                .then_with(|| {
                    if a_special {
                        Ordering::Equal
                    } else {
                        b.count.cmp(&a.count)
                    }
                })
                .then_with(|| a.seq.cmp(&b.seq))
        });

        let mut sorted = Vec::with_capacity(order.len());
        for (index, (word, tally)) in order.into_iter().enumerate() {
            tally.index = Some(index);
            sorted.push(VocabEntry {
                word: word.clone(),
                kind: tally.kind,
                index,
                count: tally.count,
                code: Code::new(),
                points: Points::new(),
            });
        }
        self.sorted = sorted;
        self.stage = Stage::Sorted;
    }

    /// Create binary Huffman tree using the word counts. Sorts first if the
    /// view is stale.
    ///
    /// # Panics
    ///
    /// If some code would exceed [`MAX_CODE_LENGTH`](crate::MAX_CODE_LENGTH).
    pub fn encode_huffman(&mut self) {
        if self.stage == Stage::Counting {
            self.sort();
        }
        let counts: Vec<u64> = self.sorted.iter().map(|e| e.count).collect();
        for (entry, path) in self.sorted.iter_mut().zip(huffman::build_paths(&counts)) {
            entry.code = path.code;
            entry.points = path.points;
        }
        self.stage = Stage::Encoded;
    }

    fn invalidate(&mut self) {
        if self.stage != Stage::Counting {
            self.sorted.clear();
            self.stage = Stage::Counting;
        }
    }

    pub fn is_sorted(&self) -> bool {
        self.stage != Stage::Counting
    }

    pub fn is_encoded(&self) -> bool {
        self.stage == Stage::Encoded
    }

    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    /// Number of occurrences of `word`, whether or not the view is current.
    pub fn count(&self, word: &str) -> Option<u64> {
        self.tallies.get(word).map(|t| t.count)
    }

    /// Sum of all counts.
    pub fn total_count(&self) -> u64 {
        self.tallies.values().map(|t| t.count).sum()
    }

    /// Returns position of a word in the vocabulary; if the word is not found,
    /// or the vocabulary has not been sorted since it last changed, returns
    /// None.
    pub fn index_of(&self, word: &str) -> Option<usize> {
        if !self.is_sorted() {
            return None;
        }
        self.tallies.get(word).and_then(|t| t.index)
    }

    pub fn lookup(&self, word: &str) -> Option<&VocabEntry> {
        self.index_of(word).map(|i| &self.sorted[i])
    }

    /// The entry at index `i` of the sorted view.
    pub fn get(&self, i: usize) -> Option<&VocabEntry> {
        self.sorted.get(i)
    }

    /// The sorted view. Empty if the vocabulary has not been sorted since it
    /// last changed.
    pub fn entries(&self) -> &[VocabEntry] {
        &self.sorted
    }

    /// Count tokens from a stream. Whenever the table outgrows
    /// [`PRUNE_LIMIT`], rare words are pruned with a rising threshold.
    pub fn count_tokens<I>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = io::Result<Token>>,
    {
        Self::count_tokens_with_limit(tokens, PRUNE_LIMIT)
    }

    fn count_tokens_with_limit<I>(tokens: I, limit: usize) -> Result<Self>
    where
        I: IntoIterator<Item = io::Result<Token>>,
    {
        let mut vocab = Vocabulary::new();
        let mut min_reduce = 1;
        let mut num_tokens: u64 = 0;
        let mut truncated: u64 = 0;
        for token in tokens {
            let token = token.context("error reading training data")?;
            if let Token::Truncated(_) = token {
                truncated += 1;
            }
            vocab.add(token.as_str());
            num_tokens += 1;
            if num_tokens % 1_000_000 == 0 {
                debug!("{}M tokens counted", num_tokens / 1_000_000);
            }
            if vocab.len() > limit {
                vocab.prune(&mut min_reduce);
            }
        }
        if truncated > 0 {
            warn!("{truncated} over-long words were truncated to their first bytes");
        }
        Ok(vocab)
    }

    /// Build a ready-to-train vocabulary: count the tokens, drop words seen
    /// fewer than `min_count` times, sort and Huffman-encode.
    pub fn learn<I>(tokens: I, min_count: u64) -> Result<Self>
    where
        I: IntoIterator<Item = io::Result<Token>>,
    {
        let mut vocab = Self::count_tokens(tokens)?;
        vocab.reduce(min_count, false);
        vocab.encode_huffman();
        info!("Vocab size: {}", vocab.len());
        info!("Words in train file: {}", vocab.total_count());
        Ok(vocab)
    }

    /// Write one `word count` line per entry, in index order if sorted.
    pub fn write_counts<W: Write>(&self, mut out: W) -> Result<()> {
        if self.is_sorted() {
            for vw in &self.sorted {
                writeln!(out, "{} {}", vw.word, vw.count).context("error writing vocab file")?;
            }
        } else {
            let mut order: Vec<(&String, &Tally)> = self.tallies.iter().collect();
            order.sort_by_key(|(_, t)| t.seq);
            for (word, tally) in order {
                writeln!(out, "{} {}", word, tally.count).context("error writing vocab file")?;
            }
        }
        out.flush().context("error writing vocab file")?;
        Ok(())
    }

    /// Read a file written by [`write_counts`](Self::write_counts). Entries
    /// below `min_count` are dropped, or folded into [`UNKNOWN`] with
    /// `fold_unknown`; the result is sorted and encoded.
    pub fn read_counts<R: BufRead>(input: R, min_count: u64, fold_unknown: bool) -> Result<Self> {
        let mut vocab = Vocabulary::new();
        for (line_num, line) in input.lines().enumerate() {
            let line = line.context("error reading vocabulary file")?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = line.split_whitespace().collect::<Vec<&str>>();
            anyhow::ensure!(
                fields.len() == 2,
                "vocabulary file syntax error on line {}",
                line_num + 1
            );
            let count = fields[1].parse::<u64>().with_context(|| {
                format!(
                    "error reading vocabulary file: unrecognized frequency number format on line {}",
                    line_num + 1
                )
            })?;
            vocab.add_count(fields[0], EntryKind::classify(fields[0]), count);
        }
        vocab.reduce(min_count, fold_unknown);
        vocab.encode_huffman();
        info!("Vocab size: {}", vocab.len());
        Ok(vocab)
    }
}

impl Index<usize> for Vocabulary {
    type Output = VocabEntry;

    /// Panics if `i` is out of range or the vocabulary is not sorted.
    fn index(&self, i: usize) -> &VocabEntry {
        &self.sorted[i]
    }
}
