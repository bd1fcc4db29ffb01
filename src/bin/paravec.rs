use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use paravec::classes::write_classes;
use paravec::text::read_tokens;
use paravec::{real, train, Corpus, ModelType, NeuralNet, TrainingConfig, VectorFormat, Vocabulary};

#[derive(Parser)]
#[command(about = "WORD AND PARAGRAPH VECTOR estimation toolkit", long_about = None)]
struct Options {
    /// Use text data from FILE to train the model; one paragraph per line
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Use FILE to save the resulting vectors / word clusters
    #[arg(long = "output", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Architecture: cbow, skipgram, pvdm, pvdm-concat or pvdbow
    #[arg(long, default_value = "cbow")]
    model: ModelType,

    /// Set size of word vectors; default is 100
    #[arg(long = "size", default_value_t = 100)]
    layer1_size: usize,

    /// Set max skip length between words
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Words to the left of the target (overrides --window)
    #[arg(long)]
    before: Option<usize>,

    /// Words to the right of the target (overrides --window)
    #[arg(long)]
    after: Option<usize>,

    /// Always use the full window instead of a random size per word
    #[arg(long)]
    fixed_window: bool,

    /// Use the same random size on both sides of the target
    #[arg(long)]
    symmetric: bool,

    /// Pad windows that run past the start of a line
    #[arg(long)]
    prepad: bool,

    /// Pad windows that run past the end of a line
    #[arg(long)]
    postpad: bool,

    /// Put the paragraph vector in the first slot of windows that run past
    /// the start of a line
    #[arg(long)]
    prepad_paragraph_once: bool,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; default
    /// is 1e-3, useful range is (0, 1e-5)
    #[arg(long, default_value_t = 1e-3)]
    sample: f64,

    /// Use Hierarchical Softmax
    #[arg(long)]
    hs: bool,

    /// Number of negative examples; default is 5, common values are 3 - 10 (0 = not used)
    #[arg(long, default_value_t = 5)]
    negative: usize,

    /// Use N threads (default: one per CPU)
    #[arg(long = "threads", value_name = "N")]
    num_threads: Option<usize>,

    /// Run more training iterations
    #[arg(long, default_value_t = 5)]
    iter: usize,

    /// Discard words that appear less than N times
    #[arg(long = "min-count", value_name = "N", default_value_t = 5)]
    min_count: u64,

    /// Count discarded words as <unk> instead of dropping them
    #[arg(long)]
    unk: bool,

    /// Set the starting learning rate; default is 0.025 for skip-gram and 0.05 for CBOW
    #[arg(long)]
    alpha: Option<real>,

    /// Seed for weight initialization and sampling
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Output word classes rather than word vectors
    #[arg(long)]
    classes: Option<usize>,

    /// Set the debug mode (default = 2 = more info during training)
    #[arg(long = "debug", default_value_t = 2)]
    debug_mode: usize,

    /// Save the resulting vectors in binary mode
    #[arg(long, group = "format")]
    binary: bool,

    /// Save the model in bincode format
    #[arg(long, group = "format")]
    bincode: bool,

    /// The vocabulary will be saved to FILE
    #[arg(long = "save-vocab", value_name = "FILE")]
    save_vocab_file: Option<PathBuf>,

    /// The vocabulary will be read from FILE, not constructed from the training data
    #[arg(long = "read-vocab", value_name = "FILE")]
    read_vocab_file: Option<PathBuf>,
}

impl Options {
    fn training_config(&self) -> TrainingConfig {
        let mut config = TrainingConfig::for_model(self.model);
        config.dim = self.layer1_size;
        config.window.before = self.before.unwrap_or(self.window);
        config.window.after = self.after.unwrap_or(self.window);
        config.window.randomize &= !self.fixed_window;
        config.window.symmetric = self.symmetric;
        config.window.prepad |= self.prepad;
        config.window.postpad |= self.postpad;
        config.window.prepad_paragraph_once = self.prepad_paragraph_once;
        config.hs = self.hs;
        config.negative = self.negative;
        config.sample = self.sample;
        config.alpha = self.alpha;
        config.epochs = self.iter;
        if let Some(n) = self.num_threads {
            config.threads = n;
        }
        config.seed = self.seed;
        config
    }

    fn vocabulary(&self) -> Result<Vocabulary> {
        if let Some(f) = &self.read_vocab_file {
            let fin = BufReader::new(File::open(f).context("error opening vocabulary file")?);
            return Vocabulary::read_counts(fin, self.min_count, self.unk);
        }
        let fin = File::open(&self.train_file).context("error opening training data file")?;
        let mut vocab = Vocabulary::count_tokens(read_tokens(fin))?;
        vocab.reduce(self.min_count, self.unk);
        vocab.encode_huffman();
        info!("Vocab size: {}", vocab.len());
        info!("Words in train file: {}", vocab.total_count());
        Ok(vocab)
    }
}

fn init_logging(debug_mode: usize) {
    let level = match debug_mode {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn train_model(options: &Options) -> Result<()> {
    info!("Starting training using file {}", options.train_file.display());

    let config = options.training_config();
    config.validate()?;

    let vocab = options.vocabulary()?;
    if let Some(f) = &options.save_vocab_file {
        let fo = BufWriter::new(File::create(f).context("error creating vocab file for write")?);
        vocab.write_counts(fo)?;
    }
    let output_file = match &options.output_file {
        Some(f) => f,
        None => return Ok(()),
    };

    let fin = File::open(&options.train_file).context("error opening training data file")?;
    let corpus = Corpus::from_reader(fin, &vocab)?;
    let net = NeuralNet::new(vocab, config, corpus.len())?;
    train(&net, &corpus, options.debug_mode > 1)?;

    if let Some(classes) = options.classes {
        let fo = BufWriter::new(File::create(output_file).context("error creating output file")?);
        write_classes(&net, fo, classes)?;
    } else if options.bincode {
        net.snapshot().save(output_file)?;
    } else {
        let format = if options.binary {
            VectorFormat::Binary
        } else {
            VectorFormat::Text
        };
        net.save_vectors(output_file, format)?;
    }
    info!("Saved output to {}", output_file.display());
    Ok(())
}

fn main() {
    let options = Options::parse();
    init_logging(options.debug_mode);

    if let Err(err) = train_model(&options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
