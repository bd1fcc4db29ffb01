use paravec::rng::Rng;
use paravec::text::read_tokens;
use paravec::{
    train, Corpus, ModelSnapshot, ModelType, NeuralNet, TrainingConfig, VectorFormat, Vectors,
    Vocabulary, WindowOptions,
};

const TOPICS: [&[&str]; 4] = [
    &["apple", "banana", "cherry", "grape", "lemon", "mango", "peach", "plum"],
    &["car", "truck", "bus", "train", "bicycle", "scooter", "tram", "ferry"],
    &["red", "green", "blue", "yellow", "purple", "orange", "black", "white"],
    &["dog", "cat", "horse", "sheep", "goat", "mouse", "rabbit", "duck"],
];

/// Lines of ten words, each line drawn from a single topic.
fn topic_corpus(lines: usize, seed: u64) -> String {
    let mut rng = Rng(seed);
    let mut text = String::new();
    for i in 0..lines {
        let topic = TOPICS[i % TOPICS.len()];
        let words: Vec<&str> = (0..10)
            .map(|_| topic[(rng.rand_u64() >> 16) as usize % topic.len()])
            .collect();
        text.push_str(&words.join(" "));
        text.push('\n');
    }
    text
}

fn topic_of(word: &str) -> Option<usize> {
    TOPICS.iter().position(|t| t.contains(&word))
}

fn build(text: &str, config: TrainingConfig) -> (NeuralNet, Corpus) {
    let vocab = Vocabulary::learn(read_tokens(text.as_bytes()), 1).unwrap();
    let corpus = Corpus::from_reader(text.as_bytes(), &vocab).unwrap();
    let net = NeuralNet::new(vocab, config, corpus.len()).unwrap();
    (net, corpus)
}

#[test]
fn single_worker_training_is_deterministic() {
    let text = topic_corpus(200, 7);
    let config = TrainingConfig {
        model: ModelType::Cbow,
        dim: 16,
        window: WindowOptions::default(),
        hs: true,
        negative: 0,
        epochs: 1,
        threads: 1,
        seed: 1234,
        ..TrainingConfig::default()
    };

    let run = || {
        let (net, corpus) = build(&text, config.clone());
        train(&net, &corpus, false).unwrap();
        (net.words().to_vec(), net.hs_weights().to_vec())
    };
    let first = run();
    let second = run();
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
    assert!(first.1.iter().any(|&w| w != 0.0));
}

/// Fraction of topic words whose nearest neighbour is in the same topic.
fn neighbour_accuracy(net: &NeuralNet) -> f64 {
    let mut buf = vec![];
    net.write_vectors(&mut buf, VectorFormat::Binary).unwrap();
    let vectors = Vectors::read(buf.as_slice(), VectorFormat::Binary).unwrap();

    let candidates: Vec<usize> = (0..vectors.len())
        .filter(|&i| topic_of(vectors.word(i)).is_none())
        .collect();
    let mut hits = 0;
    let mut total = 0;
    for i in 0..vectors.len() {
        let Some(topic) = topic_of(vectors.word(i)) else {
            continue;
        };
        let mut exclude = candidates.clone();
        exclude.push(i);
        let best = vectors.nearest(&vectors[i], 1, &exclude);
        total += 1;
        if topic_of(vectors.word(best[0].0)) == Some(topic) {
            hits += 1;
        }
    }
    hits as f64 / total as f64
}

#[test]
fn parallel_training_stays_accurate() {
    let text = topic_corpus(2000, 11);
    for model in [ModelType::SkipGram, ModelType::Cbow] {
        for run in 0..2 {
            let config = TrainingConfig {
                dim: 20,
                negative: 5,
                sample: 0.0,
                epochs: 5,
                threads: 4,
                negative_table_size: 100_000,
                ..TrainingConfig::for_model(model)
            };
            let (net, corpus) = build(&text, config);
            let summary = train(&net, &corpus, false).unwrap();
            assert_eq!(summary.epochs, vec![5; 4]);
            let accuracy = neighbour_accuracy(&net);
            assert!(
                accuracy >= 0.8,
                "{model} run {run}: nearest-neighbour accuracy {accuracy}"
            );
        }
    }
}

#[test]
fn paragraph_vectors_export_and_reload() {
    let text = topic_corpus(40, 3);
    let config = TrainingConfig {
        dim: 8,
        hs: true,
        negative: 2,
        epochs: 2,
        threads: 2,
        negative_table_size: 10_000,
        ..TrainingConfig::for_model(ModelType::Pvdbow)
    };
    let (net, corpus) = build(&text, config);
    train(&net, &corpus, false).unwrap();

    let dir = tempfile::tempdir().unwrap();
    for format in [VectorFormat::Binary, VectorFormat::Text] {
        let path = dir.path().join(format!("vectors-{format:?}"));
        net.save_vectors(&path, format).unwrap();
        let vectors = Vectors::load(&path, format).unwrap();

        let vocab_size = net.vocab().len();
        assert_eq!(vectors.len(), vocab_size + 40);
        assert_eq!(vectors.dim(), 8);
        for (i, entry) in net.vocab().entries().iter().enumerate() {
            assert_eq!(vectors.word(i), entry.word);
            let expected: Vec<u32> = net.words().row_to_vec(i).iter().map(|x| x.to_bits()).collect();
            let got: Vec<u32> = vectors[i].iter().map(|x| x.to_bits()).collect();
            assert_eq!(got, expected, "{format:?} row {i}");
        }
        for p in 0..40 {
            let row = vocab_size + p;
            assert_eq!(vectors.word(row), format!("*_{p}"));
            assert_eq!(&vectors[row], net.paragraphs().row_to_vec(p).as_slice());
        }

        // Saving the imported vectors reproduces the export byte for byte.
        let copy = dir.path().join(format!("copy-{format:?}"));
        vectors.save(&copy, format).unwrap();
        assert_eq!(std::fs::read(&copy).unwrap(), std::fs::read(&path).unwrap());
    }

    let snapshot = net.snapshot();
    for p in 0..40 {
        assert_eq!(snapshot.paragraph_vector(p), net.paragraphs().row_to_vec(p).as_slice());
    }
}

#[test]
fn snapshot_probabilities_sum_to_one() {
    let text = topic_corpus(100, 5);
    let config = TrainingConfig {
        dim: 10,
        hs: true,
        negative: 0,
        sample: 0.0,
        epochs: 10,
        threads: 1,
        ..TrainingConfig::for_model(ModelType::SkipGram)
    };
    let (net, corpus) = build(&text, config);
    train(&net, &corpus, false).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    net.snapshot().save(&path).unwrap();
    let model = ModelSnapshot::load(&path).unwrap();
    assert_eq!(model.words, net.words().to_vec());

    let n = model.vocab.len();
    for a in [1, n / 2, n - 1] {
        let total: f32 = (0..n).map(|b| model.predict(a, b)).sum();
        assert!((total - 1.0).abs() < 1e-3, "P(. | {}) sums to {total}", model.vocab[a].word);
    }

    // Words from the same topic predict each other better than words from
    // other topics.
    let apple = model.vocab.iter().position(|e| e.word == "apple").unwrap();
    let banana = model.vocab.iter().position(|e| e.word == "banana").unwrap();
    let truck = model.vocab.iter().position(|e| e.word == "truck").unwrap();
    assert!(model.predict(apple, banana) > model.predict(apple, truck));
}
