//! Training hyperparameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::negative::NEGATIVE_TABLE_SIZE;
use crate::real;
use crate::window::WindowOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Continuous bag of words: predict the target from the mean of its
    /// window.
    Cbow,
    /// Predict the target from each window word in turn.
    SkipGram,
    /// Paragraph vectors, distributed memory: CBOW with the paragraph row in
    /// the mean.
    Pvdm,
    /// Like `Pvdm`, but the paragraph and window rows are concatenated.
    PvdmConcat,
    /// Paragraph vectors, distributed bag of words: skip-gram over window
    /// slots where some slots are the paragraph row.
    Pvdbow,
}

impl ModelType {
    pub fn is_paragraph(self) -> bool {
        matches!(
            self,
            ModelType::Pvdm | ModelType::PvdmConcat | ModelType::Pvdbow
        )
    }

    /// Models that feed the output layer a mean of several rows.
    pub fn is_averaging(self) -> bool {
        matches!(self, ModelType::Cbow | ModelType::Pvdm)
    }
}

impl FromStr for ModelType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "cbow" => Ok(ModelType::Cbow),
            "skipgram" | "skip-gram" => Ok(ModelType::SkipGram),
            "pvdm" => Ok(ModelType::Pvdm),
            "pvdm-concat" => Ok(ModelType::PvdmConcat),
            "pvdbow" => Ok(ModelType::Pvdbow),
            _ => Err(ConfigError::UnknownModel(s.to_string())),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelType::Cbow => "cbow",
            ModelType::SkipGram => "skipgram",
            ModelType::Pvdm => "pvdm",
            ModelType::PvdmConcat => "pvdm-concat",
            ModelType::Pvdbow => "pvdbow",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub model: ModelType,
    /// Size of word and paragraph vectors.
    pub dim: usize,
    pub window: WindowOptions,
    /// Use hierarchical softmax.
    pub hs: bool,
    /// Number of negative examples per target; 0 disables negative sampling.
    pub negative: usize,
    /// Words occurring more often than `sample` of the corpus are randomly
    /// down-sampled; 0 disables.
    pub sample: f64,
    /// Starting learning rate. `None` picks 0.05 for averaging models and
    /// 0.025 otherwise.
    pub alpha: Option<real>,
    pub epochs: usize,
    pub threads: usize,
    pub seed: u64,
    pub negative_table_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            model: ModelType::Cbow,
            dim: 100,
            window: WindowOptions::default(),
            hs: false,
            negative: 5,
            sample: 1e-3,
            alpha: None,
            epochs: 5,
            threads: num_cpus::get(),
            seed: 1,
            negative_table_size: NEGATIVE_TABLE_SIZE,
        }
    }
}

impl TrainingConfig {
    /// A default configuration for `model`, with the window options that
    /// model needs.
    pub fn for_model(model: ModelType) -> Self {
        let mut config = TrainingConfig {
            model,
            ..TrainingConfig::default()
        };
        config.window.paragraph_mode = model.is_paragraph();
        if model == ModelType::PvdmConcat {
            config.window.randomize = false;
            config.window.prepad = true;
            config.window.postpad = true;
        }
        config
    }

    pub fn starting_alpha(&self) -> real {
        self.alpha
            .unwrap_or(if self.model.is_averaging() { 0.05 } else { 0.025 })
    }

    /// Width of the vector fed to the output layers.
    pub fn hidden_size(&self) -> usize {
        if self.model == ModelType::PvdmConcat {
            self.dim * (self.window.before + self.window.after + 1)
        } else {
            self.dim
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dim == 0 {
            return Err(ConfigError::ZeroDimension);
        }
        if self.epochs == 0 {
            return Err(ConfigError::ZeroEpochs);
        }
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if !self.hs && self.negative == 0 {
            return Err(ConfigError::NoOutputLayer);
        }
        if self.negative > 0 && self.negative_table_size == 0 {
            return Err(ConfigError::EmptyNegativeTable);
        }
        self.window.validate()?;
        if self.window.paragraph_mode != self.model.is_paragraph() {
            return Err(ConfigError::ParagraphModeMismatch {
                model: self.model,
                expected: self.model.is_paragraph(),
            });
        }
        if self.model == ModelType::PvdmConcat {
            if self.window.randomize {
                return Err(ConfigError::ConcatWindow(
                    "pvdm-concat needs a fixed window",
                ));
            }
            if !self.window.prepad || !self.window.postpad {
                return Err(ConfigError::ConcatWindow(
                    "pvdm-concat needs both prepad and postpad",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_model_names() {
        assert_eq!("cbow".parse::<ModelType>(), Ok(ModelType::Cbow));
        assert_eq!("Skip-Gram".parse::<ModelType>(), Ok(ModelType::SkipGram));
        assert_eq!("skipgram".parse::<ModelType>(), Ok(ModelType::SkipGram));
        assert_eq!("pvdm-concat".parse::<ModelType>(), Ok(ModelType::PvdmConcat));
        assert_eq!(
            "glove".parse::<ModelType>(),
            Err(ConfigError::UnknownModel("glove".to_string()))
        );
        for m in [
            ModelType::Cbow,
            ModelType::SkipGram,
            ModelType::Pvdm,
            ModelType::PvdmConcat,
            ModelType::Pvdbow,
        ] {
            assert_eq!(m.to_string().parse::<ModelType>(), Ok(m));
        }
    }

    #[test]
    fn per_model_defaults_validate() {
        for m in [
            ModelType::Cbow,
            ModelType::SkipGram,
            ModelType::Pvdm,
            ModelType::PvdmConcat,
            ModelType::Pvdbow,
        ] {
            let config = TrainingConfig::for_model(m);
            assert_eq!(config.validate(), Ok(()), "{m}");
        }
    }

    #[test]
    fn alpha_and_hidden_size() {
        let cbow = TrainingConfig::for_model(ModelType::Cbow);
        assert_eq!(cbow.starting_alpha(), 0.05);
        assert_eq!(cbow.hidden_size(), 100);

        let sg = TrainingConfig::for_model(ModelType::SkipGram);
        assert_eq!(sg.starting_alpha(), 0.025);

        let mut concat = TrainingConfig::for_model(ModelType::PvdmConcat);
        concat.dim = 10;
        concat.window.before = 2;
        concat.window.after = 3;
        assert_eq!(concat.hidden_size(), 60);
        concat.alpha = Some(0.1);
        assert_eq!(concat.starting_alpha(), 0.1);
    }

    #[test]
    fn rejects_bad_configs() {
        let mut config = TrainingConfig::for_model(ModelType::Cbow);
        config.negative = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoOutputLayer));
        config.hs = true;
        assert_eq!(config.validate(), Ok(()));

        config.dim = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDimension));

        let mut concat = TrainingConfig::for_model(ModelType::PvdmConcat);
        concat.window.randomize = true;
        assert!(matches!(concat.validate(), Err(ConfigError::ConcatWindow(_))));

        let mut pvdm = TrainingConfig::for_model(ModelType::Pvdm);
        pvdm.window.paragraph_mode = false;
        assert_eq!(
            pvdm.validate(),
            Err(ConfigError::ParagraphModeMismatch {
                model: ModelType::Pvdm,
                expected: true,
            })
        );
    }
}
