use crate::config::SamplerConfig;
use crate::corpus::{Corpus, Labels};
use crate::error::Result;
use crate::model::SequenceModel;
use crate::perm::Permutation;

use rand::Rng;
use tracing::{debug, info, warn};

/// Summary of one pass over the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepStats {
    /// Sum over sentences of the log probability of each sentence's final
    /// labels given the rest of the corpus at the time it was visited.
    pub log_likelihood: f64,
    /// Number of positions whose label changed.
    pub changed: usize,
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GibbsSampler {
    config: SamplerConfig,
}

impl GibbsSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Resamples the labels of every sentence once, in the given order.
    pub fn sweep<M: SequenceModel, R: Rng>(
        &self,
        model: &mut M,
        corpus: &Corpus,
        labels: &mut Labels,
        order: &Permutation,
        rng: &mut R,
    ) -> Result<SweepStats> {
        labels.check_parallel(corpus)?;
        let mut stats = SweepStats::default();
        for sid in order.iter() {
            let words = corpus.sentence(sid);
            let old_log_prob = model.remove_sentence(sid, words, labels.get(sid), rng)?;
            model.cache_probabilities();
            let mut proposal = labels.get(sid).to_vec();
            let (q_old, q_new) =
                model.sample_sentence(sid, words, labels.get(sid), &mut proposal, rng)?;
            let new_log_prob = model.add_sentence(sid, words, &proposal, rng)?;
            let accept = if self.config.metropolis_hastings {
                let log_ratio = new_log_prob - old_log_prob + q_old - q_new;
                log_ratio >= 0.0 || rng.random::<f64>().ln() < log_ratio
            } else {
                true
            };
            if accept {
                stats.changed += proposal
                    .iter()
                    .zip(labels.get(sid))
                    .filter(|(a, b)| a != b)
                    .count();
                stats.log_likelihood += new_log_prob;
                stats.accepted += 1;
                *labels.get_mut(sid) = proposal;
            } else {
                model.remove_sentence(sid, words, &proposal, rng)?;
                stats.log_likelihood += model.add_sentence(sid, words, labels.get(sid), rng)?;
                stats.rejected += 1;
            }
        }
        Ok(stats)
    }

    /// Runs the configured number of sweeps on an initialized model.
    pub fn run<M: SequenceModel, R: Rng>(
        &self,
        model: &mut M,
        corpus: &Corpus,
        labels: &mut Labels,
        rng: &mut R,
    ) -> Result<Vec<SweepStats>> {
        let mut order = Permutation::natural(corpus.len());
        let mut history = Vec::with_capacity(self.config.iterations);
        for iteration in 0..self.config.iterations {
            if self.config.shuffle {
                order.shuffle(rng);
            }
            let stats = self.sweep(model, corpus, labels, &order, rng)?;
            if self.config.parameter_interval > 0
                && (iteration + 1) % self.config.parameter_interval == 0
            {
                model.sample_parameters(rng)?;
                debug!(iteration, "resampled parameters");
            }
            if stats.rejected > stats.accepted {
                warn!(
                    iteration,
                    accepted = stats.accepted,
                    rejected = stats.rejected,
                    "most proposals rejected"
                );
            }
            info!(
                iteration,
                log_likelihood = stats.log_likelihood,
                changed = stats.changed,
                "finished sweep"
            );
            history.push(stats);
        }
        Ok(history)
    }
}
