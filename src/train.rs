//! Lock-free parallel training.
//!
//! Each worker owns a contiguous range of corpus lines and runs its own epochs
//! over it. Workers never wait for each other: they share the weight matrices,
//! the window generator and a word counter, all without locks. One worker may
//! still be in its second epoch when another has finished all of them.

use std::ops::Range;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::config::ModelType;
use crate::corpus::{Corpus, Line};
use crate::error::ConfigError;
use crate::layer::{accumulate, row_add_scaled, row_dot, RacyReal};
use crate::net::{NeuralNet, MAX_EXP};
use crate::real;
use crate::rng::Rng;
use crate::window::{Context, ContextWindow};

/// Workers publish progress and refresh their learning rate this often.
const PROGRESS_INTERVAL: u64 = 10_000;

/// The learning rate never decays below this fraction of its starting value.
const MIN_ALPHA_FRACTION: real = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    /// Words read by all workers over all epochs, before subsampling.
    pub words_processed: u64,
    /// Lines trained on, summed over workers and epochs.
    pub lines_trained: u64,
    /// Lines left with fewer than two words after subsampling.
    pub lines_skipped: u64,
    /// Epochs completed by each worker.
    pub epochs: Vec<usize>,
    pub elapsed: Duration,
}

/// Train `net` on `corpus` for the configured number of epochs.
///
/// With `verbose`, a progress bar tracks words processed. For paragraph
/// models the corpus must have exactly as many lines as the network has
/// paragraph rows.
pub fn train(net: &NeuralNet, corpus: &Corpus, verbose: bool) -> Result<TrainingSummary, ConfigError> {
    let config = net.config();
    if config.model.is_paragraph() && corpus.len() != net.num_paragraphs() {
        return Err(ConfigError::ParagraphCountMismatch {
            lines: corpus.len(),
            paragraphs: net.num_paragraphs(),
        });
    }

    net.window_rng.reseed(config.seed);
    net.words_processed.store(0, Ordering::Relaxed);

    let total_words = config.epochs as u64 * corpus.total_words();
    let progress = if verbose {
        let bar = ProgressBar::new(total_words);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40} {pos}/{len} words  {per_sec}  {msg}")
        {
            bar.set_style(style);
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    info!(
        "Starting training: {} lines, {} words, {} epochs, {} threads",
        corpus.len(),
        corpus.total_words(),
        config.epochs,
        config.threads
    );
    let start = Instant::now();
    let partitions = corpus.partitions(config.threads);
    let reports: Vec<WorkerReport> = thread::scope(|s| {
        let progress = &progress;
        let threads = partitions
            .into_iter()
            .enumerate()
            .map(|(id, range)| s.spawn(move || Worker::new(net, corpus, id, range, progress).run()))
            .collect::<Vec<_>>();
        threads
            .into_iter()
            .map(|thread| match thread.join() {
                Ok(report) => report,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });
    progress.finish_and_clear();

    let summary = TrainingSummary {
        words_processed: net.words_processed.load(Ordering::Relaxed),
        lines_trained: reports.iter().map(|r| r.lines_trained).sum(),
        lines_skipped: reports.iter().map(|r| r.lines_skipped).sum(),
        epochs: reports.iter().map(|r| r.epochs).collect(),
        elapsed: start.elapsed(),
    };
    info!(
        "Training finished in {:.1}s: {} words, {} lines skipped",
        summary.elapsed.as_secs_f64(),
        summary.words_processed,
        summary.lines_skipped
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    /// About to train on `line`.
    Reading { line: usize },
    /// Past the last line of the partition; either rewind or stop.
    EndOfPartition,
    Done,
}

struct WorkerReport {
    epochs: usize,
    lines_trained: u64,
    lines_skipped: u64,
}

struct Worker<'a> {
    net: &'a NeuralNet,
    corpus: &'a Corpus,
    id: usize,
    range: Range<usize>,
    progress: &'a ProgressBar,
    rng: Rng,
    starting_alpha: real,
    alpha: real,
    /// Denominator of the learning-rate schedule.
    schedule_words: u64,
    /// Threshold for subsampling, `sample * vocabulary total`.
    sample_threshold: real,
    epoch: usize,
    word_count: u64,
    last_word_count: u64,
    /// The current line after subsampling.
    sen: Vec<u32>,
    ctx: Context,
    hidden: Vec<real>,
    grad: Vec<real>,
    lines_trained: u64,
    lines_skipped: u64,
}

impl<'a> Worker<'a> {
    fn new(
        net: &'a NeuralNet,
        corpus: &'a Corpus,
        id: usize,
        range: Range<usize>,
        progress: &'a ProgressBar,
    ) -> Self {
        let config = net.config();
        let hidden_size = config.hidden_size();
        let starting_alpha = config.starting_alpha();
        Worker {
            net,
            corpus,
            id,
            range,
            progress,
            rng: Rng(config.seed.wrapping_add(id as u64)),
            starting_alpha,
            alpha: starting_alpha,
            schedule_words: config.epochs as u64 * corpus.total_words() + 1,
            sample_threshold: (config.sample * net.vocab().total_count() as f64) as real,
            epoch: 0,
            word_count: 0,
            last_word_count: 0,
            sen: Vec::with_capacity(crate::MAX_SENTENCE_LENGTH),
            ctx: Context::default(),
            hidden: vec![0.0; hidden_size],
            grad: vec![0.0; hidden_size],
            lines_trained: 0,
            lines_skipped: 0,
        }
    }

    fn run(mut self) -> WorkerReport {
        let epochs = self.net.config().epochs;
        let mut state = if self.range.is_empty() {
            WorkerState::Done
        } else {
            WorkerState::Reading {
                line: self.range.start,
            }
        };
        loop {
            state = match state {
                WorkerState::Reading { line } => {
                    let corpus = self.corpus;
                    self.train_line(&corpus.lines()[line]);
                    if line + 1 < self.range.end {
                        WorkerState::Reading { line: line + 1 }
                    } else {
                        WorkerState::EndOfPartition
                    }
                }
                WorkerState::EndOfPartition => {
                    self.epoch += 1;
                    debug!(
                        "worker {} finished epoch {} of {epochs} (alpha {})",
                        self.id, self.epoch, self.alpha
                    );
                    if self.epoch < epochs {
                        WorkerState::Reading {
                            line: self.range.start,
                        }
                    } else {
                        WorkerState::Done
                    }
                }
                WorkerState::Done => break,
            };
        }
        self.publish_progress();
        WorkerReport {
            epochs: self.epoch,
            lines_trained: self.lines_trained,
            lines_skipped: self.lines_skipped,
        }
    }

    /// Add this worker's unpublished word count to the shared counter and
    /// return the new total.
    fn publish_progress(&mut self) -> u64 {
        let n = self.word_count - self.last_word_count;
        self.last_word_count = self.word_count;
        self.progress.inc(n);
        self.net.words_processed.fetch_add(n, Ordering::Relaxed) + n
    }

    fn update_alpha(&mut self) {
        let word_count_actual = self.publish_progress();
        let remaining = 1.0 - word_count_actual as real / self.schedule_words as real;
        self.alpha = self.starting_alpha * remaining.max(MIN_ALPHA_FRACTION);
        self.progress.set_message(format!("alpha {:.6}", self.alpha));
    }

    /// The subsampling randomly discards frequent words while keeping the
    /// ranking same.
    fn subsample(&mut self, words: &[u32]) {
        self.sen.clear();
        let vocab = self.net.vocab();
        let k = self.sample_threshold;
        for &word in words {
            if k > 0.0 {
                let f = vocab[word as usize].count as real;
                let ran = ((f / k).sqrt() + 1.0) * k / f;
                if ran < self.rng.rand_real() {
                    continue;
                }
            }
            self.sen.push(word);
        }
    }

    fn train_line(&mut self, line: &Line) {
        self.word_count += line.len() as u64;
        if self.word_count - self.last_word_count > PROGRESS_INTERVAL {
            self.update_alpha();
        }

        self.subsample(&line.words);
        if self.sen.len() < 2 {
            self.lines_skipped += 1;
            return;
        }
        self.lines_trained += 1;

        let net = self.net;
        let window = ContextWindow::new(&net.config().window, &net.window_rng);
        for pos in 0..self.sen.len() {
            window.context_at(&self.sen, pos, line.id, &mut self.ctx);
            match net.config().model {
                ModelType::Cbow | ModelType::Pvdm => self.train_averaged(),
                ModelType::SkipGram | ModelType::Pvdbow => self.train_per_slot(),
                ModelType::PvdmConcat => self.train_concatenated(),
            }
        }
    }

    /// CBOW and PV-DM: the hidden layer is the mean of the window rows.
    fn train_averaged(&mut self) {
        let net = self.net;
        let ctx = &self.ctx;
        if ctx.is_empty() {
            return;
        }
        // in -> hidden
        self.hidden.fill(0.0);
        for (row, is_paragraph) in ctx.iter() {
            accumulate(&mut self.hidden, 1.0, input_row(net, row, is_paragraph));
        }
        let n = ctx.len() as real;
        for h in &mut self.hidden {
            *h /= n;
        }

        self.grad.fill(0.0);
        backward(net, &self.hidden, ctx.target, self.alpha, &mut self.grad, &mut self.rng);

        // hidden -> in
        for (row, is_paragraph) in ctx.iter() {
            row_add_scaled(input_row(net, row, is_paragraph), 1.0, &self.grad);
        }
    }

    /// Skip-gram and PV-DBOW: every slot is its own training example.
    fn train_per_slot(&mut self) {
        let net = self.net;
        let ctx = &self.ctx;
        for (row, is_paragraph) in ctx.iter() {
            let input = input_row(net, row, is_paragraph);
            for (h, w) in self.hidden.iter_mut().zip(input) {
                *h = w.get();
            }
            self.grad.fill(0.0);
            backward(net, &self.hidden, ctx.target, self.alpha, &mut self.grad, &mut self.rng);
            // Learn weights input -> hidden
            row_add_scaled(input, 1.0, &self.grad);
        }
    }

    /// PV-DM with concatenation: the paragraph row fills the first segment of
    /// the hidden layer and the window words the following ones, in order.
    fn train_concatenated(&mut self) {
        let net = self.net;
        let ctx = &self.ctx;
        let dim = net.config().dim;
        // A fixed, padded window always fills every segment.
        if ctx.len() * dim != self.hidden.len() {
            return;
        }

        for (segment, (row, is_paragraph)) in concat_segments(ctx) {
            let input = input_row(net, row, is_paragraph);
            for (h, w) in self.hidden[segment * dim..][..dim].iter_mut().zip(input) {
                *h = w.get();
            }
        }

        self.grad.fill(0.0);
        backward(net, &self.hidden, ctx.target, self.alpha, &mut self.grad, &mut self.rng);

        for (segment, (row, is_paragraph)) in concat_segments(ctx) {
            let input = input_row(net, row, is_paragraph);
            row_add_scaled(input, 1.0, &self.grad[segment * dim..][..dim]);
        }
    }
}

/// Pair each slot with its segment of the concatenated hidden layer.
fn concat_segments(ctx: &Context) -> impl Iterator<Item = (usize, (u32, bool))> + '_ {
    let mut next_word_segment = 1;
    ctx.iter().map(move |(row, is_paragraph)| {
        if is_paragraph {
            (0, (row, is_paragraph))
        } else {
            let segment = next_word_segment;
            next_word_segment += 1;
            (segment, (row, is_paragraph))
        }
    })
}

fn input_row(net: &NeuralNet, row: u32, is_paragraph: bool) -> &[RacyReal] {
    if is_paragraph {
        net.paragraphs.row(row as usize)
    } else {
        net.words.row(row as usize)
    }
}

/// Run the output layers for one example. Output rows are updated as they
/// are visited; the gradient with respect to `hidden` is added to `grad` for
/// the caller to scatter into the input rows.
fn backward(
    net: &NeuralNet,
    hidden: &[real],
    target: u32,
    alpha: real,
    grad: &mut [real],
    rng: &mut Rng,
) {
    let config = net.config();

    // HIERARCHICAL SOFTMAX
    if config.hs {
        let vw = &net.vocab()[target as usize];
        for (&point, &bit) in vw.points.iter().zip(vw.code.iter()) {
            let out = net.hs.row(point as usize);
            // Propagate hidden -> output
            let f = row_dot(hidden, out);
            if f <= -MAX_EXP || f >= MAX_EXP {
                continue;
            }
            let f = net.sigmoid(f);
            // 'g' is the gradient multiplied by the learning rate
            let g = (1.0 - bit as real - f) * alpha;
            // Propagate errors output -> hidden
            accumulate(grad, g, out);
            // Learn weights hidden -> output
            row_add_scaled(out, g, hidden);
        }
    }

    // NEGATIVE SAMPLING
    if let Some(table) = &net.table {
        for d in 0..=config.negative {
            let (sample, label) = if d == 0 {
                (target, 1.0)
            } else {
                match table.sample_excluding(rng, target) {
                    Some(sample) => (sample, 0.0),
                    None => continue,
                }
            };
            let out = net.neg.row(sample as usize);
            let f = row_dot(hidden, out);
            let g = (label - net.sigmoid(f)) * alpha;
            accumulate(grad, g, out);
            row_add_scaled(out, g, hidden);
        }
    }
}
