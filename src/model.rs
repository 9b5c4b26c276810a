use crate::corpus::{Corpus, Labels};
use crate::error::Result;

use rand::Rng;

/// What a collapsed Gibbs sweep needs from a sentence labeling model.
/// Sentences are word ids and labels are class ids of the same length.
pub trait SequenceModel: Clone {
    /// Adds every sentence of `corpus` under `labels` to an empty model.
    fn initialize<R: Rng>(&mut self, corpus: &Corpus, labels: &Labels, rng: &mut R)
        -> Result<f64>;

    /// Adds the statistics of one sentence and returns its log probability
    /// under the model as it was before the call.
    fn add_sentence<R: Rng>(
        &mut self,
        sid: usize,
        words: &[usize],
        labels: &[usize],
        rng: &mut R,
    ) -> Result<f64>;

    /// Retracts what `add_sentence` added for the same `labels` and returns the
    /// log probability of the removed assignment under the remaining model.
    fn remove_sentence<R: Rng>(
        &mut self,
        sid: usize,
        words: &[usize],
        labels: &[usize],
        rng: &mut R,
    ) -> Result<f64>;

    /// Draws new labels for a sentence whose statistics are not in the model.
    /// Returns the log probabilities of the old and new labels.
    fn sample_sentence<R: Rng>(
        &self,
        sid: usize,
        words: &[usize],
        old_labels: &[usize],
        new_labels: &mut [usize],
        rng: &mut R,
    ) -> Result<(f64, f64)>;

    fn cache_probabilities(&mut self);

    fn sample_parameters<R: Rng>(&mut self, rng: &mut R) -> Result<()>;

    fn check_empty(&self) -> Result<()>;
}
