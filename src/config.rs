use crate::error::{Error, Result};
use crate::prelude::*;

use serde::{Deserialize, Serialize};

/// Initial strength and discount of a family of restaurants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PypParams {
    pub strength: f64,
    pub discount: f64,
}

impl Default for PypParams {
    fn default() -> Self {
        Self {
            strength: 1.0,
            discount: 0.5,
        }
    }
}

impl PypParams {
    pub fn validate(&self, family: &str) -> Result<(Strength, Discount)> {
        let discount = Discount::try_new(self.discount).ok_or_else(|| {
            Error::Configuration(format!(
                "{} discount {} must be in [0,1)",
                family, self.discount
            ))
        })?;
        let strength = Strength::try_new_with_variable_constraint(self.strength, self.discount)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "{} strength {} must be greater than -{}",
                    family, self.strength, self.discount
                ))
            })?;
        Ok((strength, discount))
    }
}

/// How the strength and discount of a restaurant are resampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSampler {
    /// Auxiliary-variable scheme with conjugate Beta/Gamma updates.
    #[default]
    Auxiliary,
    /// Univariate slice sampling of each parameter in turn.
    Slice,
}

/// Prior on the hyperparameters of a family of restaurants: strength is
/// Gamma(strength_shape, strength_rate) and discount is Beta(discount_a, discount_b).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperPrior {
    pub strength_shape: f64,
    pub strength_rate: f64,
    pub discount_a: f64,
    pub discount_b: f64,
    pub sampler: ParameterSampler,
}

impl Default for HyperPrior {
    fn default() -> Self {
        Self {
            strength_shape: 1.0,
            strength_rate: 1.0,
            discount_a: 1.0,
            discount_b: 1.0,
            sampler: ParameterSampler::default(),
        }
    }
}

impl HyperPrior {
    pub fn validate(&self, family: &str) -> Result<()> {
        let fields = [
            ("strength shape", self.strength_shape),
            ("strength rate", self.strength_rate),
            ("discount a", self.discount_a),
            ("discount b", self.discount_b),
        ];
        for (name, value) in fields {
            if Shape::try_new(value).is_none() {
                return Err(Error::Configuration(format!(
                    "{} prior {} must be positive and finite, got {}",
                    family, name, value
                )));
            }
        }
        Ok(())
    }
}

/// Parameters of an `HmmModel`.  `classes` excludes the boundary state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmmConfig {
    pub classes: usize,
    pub words: usize,
    #[serde(default)]
    pub transition: PypParams,
    #[serde(default)]
    pub emission: PypParams,
    #[serde(default)]
    pub transition_prior: HyperPrior,
    #[serde(default)]
    pub emission_prior: HyperPrior,
}

impl HmmConfig {
    pub fn new(classes: usize, words: usize) -> Self {
        Self {
            classes,
            words,
            transition: PypParams::default(),
            emission: PypParams::default(),
            transition_prior: HyperPrior::default(),
            emission_prior: HyperPrior::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.words == 0 {
            return Err(Error::Configuration("No words in HMM model".into()));
        }
        if self.classes == 0 {
            return Err(Error::Configuration("No classes in HMM model".into()));
        }
        self.transition.validate("transition")?;
        self.emission.validate("emission")?;
        self.transition_prior.validate("transition")?;
        self.emission_prior.validate("emission")?;
        Ok(())
    }
}

/// Parameters of the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub iterations: usize,
    /// Resample hyperparameters after every this many sweeps; zero disables it.
    pub parameter_interval: usize,
    /// Visit sentences in a fresh random order on every sweep.
    pub shuffle: bool,
    /// Correct each sentence proposal with a Metropolis-Hastings step.
    pub metropolis_hastings: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            parameter_interval: 10,
            shuffle: true,
            metropolis_hastings: false,
        }
    }
}
