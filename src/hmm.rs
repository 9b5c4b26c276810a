// Hidden Markov model with Pitman-Yor transitions and emissions

use crate::config::{HmmConfig, HyperPrior};
use crate::corpus::{ClassSent, Corpus, Labels};
use crate::error::{Error, Result};
use crate::index::{DenseIndex, SparseIndex};
use crate::model::SequenceModel;
use crate::pyp::PyDist;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use rand_pcg::Pcg64Mcg;
use std::collections::HashMap;
use tracing::{debug, info, trace};

/// State marking the start and the end of every sentence.
pub const BOUNDARY: usize = 0;

#[derive(Debug, Clone)]
pub struct HmmModel {
    classes: usize,
    words: usize,
    t_dists: Vec<PyDist<DenseIndex>>,
    e_dists: Vec<PyDist<SparseIndex>>,
    t_mat: Vec<f64>,
    base_e: Vec<f64>,
    base_t: Vec<f64>,
    cache_valid: bool,
    transition_prior: HyperPrior,
    emission_prior: HyperPrior,
    seated: HashMap<usize, Vec<SentenceSeating>>,
}

/// Where the customers of one added sentence sat, in insertion order:
/// `transitions[i]` is the table of the move into position `i` (the last one
/// being the move back to the boundary), `emissions[i]` that of word `i`.
#[derive(Debug, Clone)]
struct SentenceSeating {
    words: Vec<usize>,
    labels: Vec<usize>,
    transitions: Vec<usize>,
    emissions: Vec<usize>,
}

/// Scaled forward probabilities of one sentence.  Row `i` holds, for every
/// state, the probability of the first `i + 1` words ending in that state,
/// divided by the running product of row sums.
#[derive(Debug, Clone)]
pub struct ForwardTable {
    n_states: usize,
    probs: Vec<f64>,
    log_marginal: f64,
}

impl ForwardTable {
    pub fn len(&self) -> usize {
        self.probs.len() / self.n_states
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.probs[i * self.n_states..(i + 1) * self.n_states]
    }

    /// Log probability of the whole sentence, summed over label sequences
    /// (or of the best sequence for a max-product table).
    pub fn log_marginal(&self) -> f64 {
        self.log_marginal
    }
}

impl HmmModel {
    pub fn new(config: &HmmConfig) -> Result<Self> {
        config.validate()?;
        let (t_strength, t_discount) = config.transition.validate("transition")?;
        let (e_strength, e_discount) = config.emission.validate("emission")?;
        let n_states = config.classes + 1;
        info!(
            words = config.words,
            classes = config.classes,
            "creating HMM model"
        );
        let mut model = Self {
            classes: config.classes,
            words: config.words,
            t_dists: (0..n_states)
                .map(|_| PyDist::with_outcomes(n_states, t_strength, t_discount))
                .collect(),
            e_dists: (0..n_states)
                .map(|_| PyDist::new(e_strength, e_discount))
                .collect(),
            t_mat: vec![0.0; n_states * n_states],
            base_e: vec![1.0 / (config.words as f64); config.words],
            base_t: vec![1.0 / (n_states as f64); n_states],
            cache_valid: false,
            transition_prior: config.transition_prior,
            emission_prior: config.emission_prior,
            seated: HashMap::new(),
        };
        model.cache_probabilities();
        Ok(model)
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn words(&self) -> usize {
        self.words
    }

    /// Number of states including the boundary.
    pub fn n_states(&self) -> usize {
        self.classes + 1
    }

    pub fn transition_dist(&self, from: usize) -> &PyDist<DenseIndex> {
        &self.t_dists[from]
    }

    pub fn emission_dist(&self, class: usize) -> &PyDist<SparseIndex> {
        &self.e_dists[class]
    }

    pub fn is_cache_valid(&self) -> bool {
        self.cache_valid
    }

    pub fn cached_transition_prob(&self, from: usize, to: usize) -> Option<f64> {
        if self.cache_valid {
            Some(self.t_mat[from * self.n_states() + to])
        } else {
            None
        }
    }

    /// Probability of moving from `from` to `to`, from the cache when it is
    /// valid and from the restaurant otherwise.
    pub fn transition_prob(&self, from: usize, to: usize) -> f64 {
        match self.cached_transition_prob(from, to) {
            Some(p) => p,
            None => self.t_dists[from].prob(to, self.base_t[to]),
        }
    }

    /// Emissions are always read from the restaurant; only transitions are
    /// cached.
    pub fn emission_prob(&self, class: usize, word: usize) -> f64 {
        self.e_dists[class].prob(word, self.base_e[word])
    }

    fn check_words(&self, words: &[usize]) -> Result<()> {
        match words.iter().find(|&&w| w >= self.words) {
            Some(&w) => Err(Error::OutOfRange {
                kind: "word",
                value: w,
                lower: 0,
                upper: self.words,
            }),
            None => Ok(()),
        }
    }

    fn check_sentence(&self, words: &[usize], labels: &[usize]) -> Result<()> {
        if words.len() != labels.len() {
            return Err(Error::LengthMismatch {
                words: words.len(),
                labels: labels.len(),
            });
        }
        self.check_words(words)?;
        match labels.iter().find(|&&c| c == BOUNDARY || c > self.classes) {
            Some(&c) => Err(Error::OutOfRange {
                kind: "class",
                value: c,
                lower: 1,
                upper: self.classes + 1,
            }),
            None => Ok(()),
        }
    }

    // Every customer the sentence would have contributed must still be seated.
    fn check_removable(&self, words: &[usize], labels: &[usize]) -> Result<()> {
        let mut transitions: HashMap<(usize, usize), usize> = HashMap::new();
        let mut emissions: HashMap<(usize, usize), usize> = HashMap::new();
        let mut prev = BOUNDARY;
        for (&word, &class) in words.iter().zip(labels) {
            *transitions.entry((prev, class)).or_insert(0) += 1;
            *emissions.entry((class, word)).or_insert(0) += 1;
            prev = class;
        }
        *transitions.entry((prev, BOUNDARY)).or_insert(0) += 1;
        for ((from, to), needed) in transitions {
            if self.t_dists[from].customers_of(to) < needed {
                return Err(Error::NotAdded {
                    family: "Transition",
                    class: from,
                    outcome: to,
                });
            }
        }
        for ((class, word), needed) in emissions {
            if self.e_dists[class].customers_of(word) < needed {
                return Err(Error::NotAdded {
                    family: "Emission",
                    class,
                    outcome: word,
                });
            }
        }
        Ok(())
    }

    // Pops the latest record of `sid` added with exactly these words and labels.
    fn take_record(
        &mut self,
        sid: usize,
        words: &[usize],
        labels: &[usize],
    ) -> Result<SentenceSeating> {
        let records = self
            .seated
            .get_mut(&sid)
            .ok_or(Error::SentenceNotAdded { sid })?;
        let position = records
            .iter()
            .rposition(|r| r.words == words && r.labels == labels)
            .ok_or(Error::SentenceNotAdded { sid })?;
        let record = records.remove(position);
        if records.is_empty() {
            self.seated.remove(&sid);
        }
        Ok(record)
    }

    /// Log probability of `labels` for `words` with the current (fixed)
    /// probabilities, including the transitions out of and into the boundary.
    pub fn path_log_prob(&self, words: &[usize], labels: &[usize]) -> Result<f64> {
        self.check_sentence(words, labels)?;
        Ok(self.path_log_prob_unchecked(words, labels))
    }

    fn path_log_prob_unchecked(&self, words: &[usize], labels: &[usize]) -> f64 {
        let mut log_prob = 0.0;
        let mut prev = BOUNDARY;
        for (&word, &class) in words.iter().zip(labels) {
            log_prob += self.transition_prob(prev, class).ln() + self.emission_prob(class, word).ln();
            prev = class;
        }
        log_prob + self.transition_prob(prev, BOUNDARY).ln()
    }

    /// Forward pass over the class lattice, summing over predecessors or, with
    /// `max_product`, keeping only the best one.
    pub fn forward(&self, words: &[usize], max_product: bool) -> Result<ForwardTable> {
        self.check_words(words)?;
        let k = self.n_states();
        let mut probs = vec![0.0; words.len() * k];
        let mut log_scale = 0.0;
        for (i, &word) in words.iter().enumerate() {
            let (done, rest) = probs.split_at_mut(i * k);
            let row = &mut rest[..k];
            for c in 1..k {
                let reach = if i == 0 {
                    self.transition_prob(BOUNDARY, c)
                } else {
                    let prev = &done[(i - 1) * k..];
                    let terms = (1..k).map(|p| prev[p] * self.transition_prob(p, c));
                    if max_product {
                        terms.fold(0.0, f64::max)
                    } else {
                        terms.sum::<f64>()
                    }
                };
                row[c] = reach * self.emission_prob(c, word);
            }
            let norm: f64 = row.iter().sum();
            if !(norm > 0.0 && norm.is_finite()) {
                return Err(Error::NumericalDegeneracy { position: i });
            }
            row.iter_mut().for_each(|p| *p /= norm);
            log_scale += norm.ln();
        }
        let last = match words.len() {
            0 => self.transition_prob(BOUNDARY, BOUNDARY),
            n => {
                let row = &probs[(n - 1) * k..];
                let terms = (1..k).map(|c| row[c] * self.transition_prob(c, BOUNDARY));
                if max_product {
                    terms.fold(0.0, f64::max)
                } else {
                    terms.sum::<f64>()
                }
            }
        };
        if !(last > 0.0) {
            return Err(Error::NumericalDegeneracy {
                position: words.len(),
            });
        }
        Ok(ForwardTable {
            n_states: k,
            probs,
            log_marginal: log_scale + last.ln(),
        })
    }

    /// Walks `forward` from the sentence end, writing a class for every
    /// position into `tags`.  With an `rng` each class is drawn in proportion
    /// to its forward weight times the probability of moving to the class
    /// already chosen on its right; without one the heaviest class is taken.
    /// Returns the log of the chosen weights' normalized shares, which in the
    /// sampling case is the log probability of drawing `tags`.
    pub fn backward_step<R: Rng>(
        &self,
        forward: &ForwardTable,
        tags: &mut [usize],
        mut rng: Option<&mut R>,
    ) -> Result<f64> {
        if tags.len() != forward.len() {
            return Err(Error::LengthMismatch {
                words: forward.len(),
                labels: tags.len(),
            });
        }
        let k = self.n_states();
        let mut weights = vec![0.0; k];
        let mut next = BOUNDARY;
        let mut log_prob = 0.0;
        for i in (0..forward.len()).rev() {
            let row = forward.row(i);
            for c in 1..k {
                weights[c] = row[c] * self.transition_prob(c, next);
            }
            let total: f64 = weights.iter().sum();
            if !(total > 0.0 && total.is_finite()) {
                return Err(Error::NumericalDegeneracy { position: i });
            }
            let chosen = match rng.as_deref_mut() {
                Some(rng) => WeightedIndex::new(&weights)
                    .map_err(|_| Error::NumericalDegeneracy { position: i })?
                    .sample(rng),
                None => {
                    weights
                        .iter()
                        .enumerate()
                        .skip(1)
                        .fold((BOUNDARY, f64::NEG_INFINITY), |best, (c, &w)| {
                            if w > best.1 {
                                (c, w)
                            } else {
                                best
                            }
                        })
                        .0
                }
            };
            log_prob += (weights[chosen] / total).ln();
            tags[i] = chosen;
            next = chosen;
        }
        Ok(log_prob)
    }

    /// Most probable class sequence for `words` under the current model.
    pub fn decode_sentence(&self, words: &[usize]) -> Result<ClassSent> {
        let forward = self.forward(words, true)?;
        let mut tags = vec![BOUNDARY; words.len()];
        self.backward_step::<Pcg64Mcg>(&forward, &mut tags, None)?;
        Ok(tags)
    }
}

impl SequenceModel for HmmModel {
    fn initialize<R: Rng>(
        &mut self,
        corpus: &Corpus,
        labels: &Labels,
        rng: &mut R,
    ) -> Result<f64> {
        self.check_empty()?;
        labels.check_parallel(corpus)?;
        for (words, classes) in corpus.sentences().iter().zip(labels.as_slice()) {
            self.check_sentence(words, classes)?;
        }
        let mut log_prob = 0.0;
        for sid in 0..corpus.len() {
            log_prob += self.add_sentence(sid, corpus.sentence(sid), labels.get(sid), rng)?;
        }
        info!(sentences = corpus.len(), log_prob, "initialized HMM model");
        Ok(log_prob)
    }

    fn add_sentence<R: Rng>(
        &mut self,
        sid: usize,
        words: &[usize],
        labels: &[usize],
        rng: &mut R,
    ) -> Result<f64> {
        self.check_sentence(words, labels)?;
        self.cache_valid = false;
        let mut record = SentenceSeating {
            words: words.to_vec(),
            labels: labels.to_vec(),
            transitions: Vec::with_capacity(words.len() + 1),
            emissions: Vec::with_capacity(words.len()),
        };
        let mut log_prob = 0.0;
        let mut prev = BOUNDARY;
        for (&word, &class) in words.iter().zip(labels) {
            let (prob, table) = self.t_dists[prev].seat(class, self.base_t[class], rng);
            log_prob += prob.ln();
            record.transitions.push(table);
            let (prob, table) = self.e_dists[class].seat(word, self.base_e[word], rng);
            log_prob += prob.ln();
            record.emissions.push(table);
            prev = class;
        }
        let (prob, table) = self.t_dists[prev].seat(BOUNDARY, self.base_t[BOUNDARY], rng);
        log_prob += prob.ln();
        record.transitions.push(table);
        self.seated.entry(sid).or_default().push(record);
        trace!(sid, log_prob, "added sentence");
        Ok(log_prob)
    }

    fn remove_sentence<R: Rng>(
        &mut self,
        sid: usize,
        words: &[usize],
        labels: &[usize],
        _rng: &mut R,
    ) -> Result<f64> {
        self.check_sentence(words, labels)?;
        self.check_removable(words, labels)?;
        let record = self.take_record(sid, words, labels)?;
        self.cache_valid = false;
        let n = words.len();
        let last = labels.last().copied().unwrap_or(BOUNDARY);
        let mut log_prob = self.t_dists[last]
            .unseat(BOUNDARY, record.transitions[n], self.base_t[BOUNDARY])
            .ln();
        for i in (0..n).rev() {
            let (word, class) = (words[i], labels[i]);
            let prev = if i == 0 { BOUNDARY } else { labels[i - 1] };
            log_prob += self.e_dists[class]
                .unseat(word, record.emissions[i], self.base_e[word])
                .ln();
            log_prob += self.t_dists[prev]
                .unseat(class, record.transitions[i], self.base_t[class])
                .ln();
        }
        trace!(sid, log_prob, "removed sentence");
        Ok(log_prob)
    }

    fn sample_sentence<R: Rng>(
        &self,
        sid: usize,
        words: &[usize],
        old_labels: &[usize],
        new_labels: &mut [usize],
        rng: &mut R,
    ) -> Result<(f64, f64)> {
        self.check_sentence(words, old_labels)?;
        if new_labels.len() != words.len() {
            return Err(Error::LengthMismatch {
                words: words.len(),
                labels: new_labels.len(),
            });
        }
        let forward = self.forward(words, false)?;
        self.backward_step(&forward, new_labels, Some(rng))?;
        let old_log_prob = self.path_log_prob_unchecked(words, old_labels);
        let new_log_prob = self.path_log_prob_unchecked(words, new_labels);
        trace!(sid, old_log_prob, new_log_prob, "sampled sentence");
        Ok((old_log_prob, new_log_prob))
    }

    fn cache_probabilities(&mut self) {
        let n_states = self.n_states();
        for from in 0..n_states {
            for to in 0..n_states {
                self.t_mat[from * n_states + to] = self.t_dists[from].prob(to, self.base_t[to]);
            }
        }
        self.cache_valid = true;
    }

    fn sample_parameters<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        for dist in self.t_dists.iter_mut() {
            dist.sample_parameters(&self.transition_prior, rng)?;
        }
        for dist in self.e_dists.iter_mut() {
            dist.sample_parameters(&self.emission_prior, rng)?;
        }
        self.cache_probabilities();
        debug!(
            t_strength = self.t_dists[0].strength(),
            t_discount = self.t_dists[0].discount(),
            e_strength = self.e_dists[0].strength(),
            e_discount = self.e_dists[0].discount(),
            "resampled hyperparameters"
        );
        Ok(())
    }

    fn check_empty(&self) -> Result<()> {
        let families = [
            (
                "Transition",
                self.t_dists
                    .iter()
                    .map(|d| (d.table_count(), d.customer_count()))
                    .collect::<Vec<_>>(),
            ),
            (
                "Emission",
                self.e_dists
                    .iter()
                    .map(|d| (d.table_count(), d.customer_count()))
                    .collect::<Vec<_>>(),
            ),
        ];
        for (family, counts) in families {
            for (class, (tables, customers)) in counts.into_iter().enumerate() {
                if tables != 0 || customers != 0 {
                    return Err(Error::InvariantViolation {
                        family,
                        class,
                        tables,
                        customers,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParameterSampler;
    use crate::index::Seating;
    use crate::perm::Permutation;
    use crate::testing::{assert_goodness_of_fit, assert_sums_to_one, label_sequences};
    use rand::SeedableRng;

    fn model(classes: usize, words: usize) -> HmmModel {
        HmmModel::new(&HmmConfig::new(classes, words)).unwrap()
    }

    fn small_corpus() -> Corpus {
        Corpus::from_sentences(vec![
            vec![0, 1, 2, 3],
            vec![1, 1, 0],
            vec![3, 2],
            vec![0],
            vec![2, 0, 1, 3, 3, 1],
            vec![1, 2, 3, 0, 2],
        ])
    }

    fn trained(classes: usize, seed: u64) -> (HmmModel, Corpus, Labels, Pcg64Mcg) {
        let rng = &mut Pcg64Mcg::seed_from_u64(seed);
        let corpus = small_corpus();
        let labels = Labels::random(&corpus, classes, rng).unwrap();
        let mut hmm = model(classes, corpus.n_words());
        hmm.initialize(&corpus, &labels, rng).unwrap();
        (hmm, corpus, labels, rng.clone())
    }

    fn transition_customers(hmm: &HmmModel) -> Vec<usize> {
        let k = hmm.n_states();
        (0..k * k)
            .map(|i| hmm.transition_dist(i / k).customers_of(i % k))
            .collect()
    }

    fn emission_customers(hmm: &HmmModel) -> Vec<usize> {
        let (k, w) = (hmm.n_states(), hmm.words());
        (0..k * w)
            .map(|i| hmm.emission_dist(i / w).customers_of(i % w))
            .collect()
    }

    // Full seating of every restaurant, tables included.
    fn seatings(hmm: &HmmModel) -> Vec<Option<Seating>> {
        let k = hmm.n_states();
        let mut all = Vec::new();
        for class in 0..k {
            let t = hmm.transition_dist(class);
            let e = hmm.emission_dist(class);
            all.extend((0..k).map(|to| t.seating(to).cloned()));
            all.extend((0..hmm.words()).map(|w| e.seating(w).cloned()));
        }
        all
    }

    fn table_counts(hmm: &HmmModel) -> Vec<(usize, usize)> {
        (0..hmm.n_states())
            .map(|c| {
                (
                    hmm.transition_dist(c).table_count(),
                    hmm.emission_dist(c).table_count(),
                )
            })
            .collect()
    }

    fn assert_cache_matches_restaurants(hmm: &HmmModel) {
        let k = hmm.n_states();
        for from in 0..k {
            for to in 0..k {
                let live = hmm.transition_dist(from).prob(to, 1.0 / (k as f64));
                let cached = hmm.cached_transition_prob(from, to).unwrap();
                assert!((live - cached).abs() < 1e-12, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_add_and_remove_one_sentence() {
        let rng = &mut Pcg64Mcg::seed_from_u64(1);
        let mut hmm = model(2, 3);
        let log_prob = hmm.add_sentence(0, &[0, 1], &[1, 2], rng).unwrap();
        assert!((log_prob - 5.0 * (1.0_f64 / 3.0).ln()).abs() < 1e-12);
        assert_eq!(hmm.transition_dist(BOUNDARY).customers_of(1), 1);
        assert_eq!(hmm.transition_dist(BOUNDARY).tables_of(1), 1);
        assert_eq!(hmm.transition_dist(1).customers_of(2), 1);
        assert_eq!(hmm.transition_dist(2).customers_of(BOUNDARY), 1);
        assert_eq!(hmm.emission_dist(1).customers_of(0), 1);
        assert_eq!(hmm.emission_dist(2).customers_of(1), 1);
        assert!(matches!(
            hmm.check_empty(),
            Err(Error::InvariantViolation {
                family: "Transition",
                class: 0,
                tables: 1,
                customers: 1
            })
        ));

        let log_prob = hmm.remove_sentence(0, &[0, 1], &[1, 2], rng).unwrap();
        assert!((log_prob - 5.0 * (1.0_f64 / 3.0).ln()).abs() < 1e-12);
        assert_eq!(hmm.transition_dist(BOUNDARY).customers_of(1), 0);
        assert_eq!(hmm.transition_dist(BOUNDARY).tables_of(1), 0);
        assert_eq!(hmm.transition_dist(1).customers_of(2), 0);
        assert_eq!(hmm.emission_dist(1).customers_of(0), 0);
        assert_eq!(hmm.emission_dist(2).customers_of(1), 0);
        hmm.check_empty().unwrap();
    }

    #[test]
    fn test_add_then_remove_restores_seating() {
        let (mut hmm, _, _, mut rng) = trained(3, 2);
        let transitions = transition_customers(&hmm);
        let emissions = emission_customers(&hmm);
        let before = seatings(&hmm);
        let (words, labels) = ([2, 3, 3, 0], [1, 3, 3, 2]);
        let added = hmm.add_sentence(99, &words, &labels, &mut rng).unwrap();
        assert_ne!(transition_customers(&hmm), transitions);
        let removed = hmm.remove_sentence(99, &words, &labels, &mut rng).unwrap();
        assert!((added - removed).abs() < 1e-12);
        assert_eq!(transition_customers(&hmm), transitions);
        assert_eq!(emission_customers(&hmm), emissions);
        assert_eq!(seatings(&hmm), before);
        for class in 0..hmm.n_states() {
            let t = hmm.transition_dist(class);
            let e = hmm.emission_dist(class);
            assert!(t.table_count() <= t.customer_count());
            assert!(e.table_count() <= e.customer_count());
            assert_eq!(
                t.seatings().map(|(_, s)| s.n_tables()).sum::<usize>(),
                t.table_count()
            );
        }
    }

    #[test]
    fn test_round_trip_keeps_table_counts_on_shared_outcomes() {
        for seed in 0..200 {
            let rng = &mut Pcg64Mcg::seed_from_u64(seed);
            let mut hmm = model(1, 1);
            for sid in 0..5 {
                hmm.add_sentence(sid, &[0, 0, 0], &[1, 1, 1], rng).unwrap();
            }
            let counts = table_counts(&hmm);
            let before = seatings(&hmm);
            hmm.add_sentence(5, &[0], &[1], rng).unwrap();
            hmm.remove_sentence(5, &[0], &[1], rng).unwrap();
            assert_eq!(table_counts(&hmm), counts, "seed {}", seed);
            assert_eq!(seatings(&hmm), before, "seed {}", seed);
        }
    }

    #[test]
    fn test_remove_without_matching_add_fails_without_mutation() {
        let rng = &mut Pcg64Mcg::seed_from_u64(18);
        let mut hmm = model(2, 3);
        hmm.add_sentence(0, &[0, 1], &[1, 2], rng).unwrap();
        hmm.add_sentence(1, &[0, 1], &[1, 2], rng).unwrap();
        let before = seatings(&hmm);
        assert!(matches!(
            hmm.remove_sentence(2, &[0, 1], &[1, 2], rng),
            Err(Error::SentenceNotAdded { sid: 2 })
        ));
        assert!(matches!(
            hmm.remove_sentence(0, &[0, 1], &[1, 1], rng),
            Err(Error::NotAdded { .. })
        ));
        assert_eq!(seatings(&hmm), before);
        hmm.remove_sentence(0, &[0, 1], &[1, 2], rng).unwrap();
        assert!(matches!(
            hmm.remove_sentence(0, &[0, 1], &[1, 2], rng),
            Err(Error::SentenceNotAdded { sid: 0 })
        ));
        hmm.remove_sentence(1, &[0, 1], &[1, 2], rng).unwrap();
        hmm.check_empty().unwrap();
    }

    #[test]
    fn test_removing_everything_leaves_model_empty() {
        let (mut hmm, corpus, mut labels, mut rng) = trained(3, 3);
        for _ in 0..3 {
            for sid in 0..corpus.len() {
                let words = corpus.sentence(sid);
                hmm.remove_sentence(sid, words, labels.get(sid), &mut rng)
                    .unwrap();
                let mut new_labels = labels.get(sid).to_vec();
                hmm.sample_sentence(sid, words, labels.get(sid), &mut new_labels, &mut rng)
                    .unwrap();
                hmm.add_sentence(sid, words, &new_labels, &mut rng).unwrap();
                *labels.get_mut(sid) = new_labels;
            }
        }
        let order = Permutation::random(corpus.len(), &mut rng);
        for sid in order.iter() {
            assert!(hmm.check_empty().is_err());
            hmm.remove_sentence(sid, corpus.sentence(sid), labels.get(sid), &mut rng)
                .unwrap();
        }
        hmm.check_empty().unwrap();
    }

    #[test]
    fn test_remove_unknown_assignment_fails_without_mutation() {
        let rng = &mut Pcg64Mcg::seed_from_u64(4);
        let mut hmm = model(2, 3);
        hmm.add_sentence(0, &[0, 1], &[1, 2], rng).unwrap();
        assert!(matches!(
            hmm.remove_sentence(0, &[0, 1], &[2, 2], rng),
            Err(Error::NotAdded {
                family: "Transition",
                ..
            })
        ));
        assert!(matches!(
            hmm.remove_sentence(0, &[0, 2], &[1, 2], rng),
            Err(Error::NotAdded {
                family: "Emission",
                class: 2,
                outcome: 2
            })
        ));
        assert_eq!(hmm.transition_dist(BOUNDARY).customer_count(), 1);
        hmm.remove_sentence(0, &[0, 1], &[1, 2], rng).unwrap();
        hmm.check_empty().unwrap();
    }

    #[test]
    fn test_invalid_sentences_rejected() {
        let rng = &mut Pcg64Mcg::seed_from_u64(5);
        let mut hmm = model(2, 3);
        assert!(matches!(
            hmm.add_sentence(0, &[0, 3], &[1, 2], rng),
            Err(Error::OutOfRange { kind: "word", value: 3, .. })
        ));
        assert!(matches!(
            hmm.add_sentence(0, &[0, 1], &[0, 2], rng),
            Err(Error::OutOfRange { kind: "class", value: 0, .. })
        ));
        assert!(matches!(
            hmm.add_sentence(0, &[0, 1], &[1, 3], rng),
            Err(Error::OutOfRange { kind: "class", value: 3, .. })
        ));
        assert!(matches!(
            hmm.add_sentence(0, &[0, 1], &[1], rng),
            Err(Error::LengthMismatch { words: 2, labels: 1 })
        ));
        hmm.check_empty().unwrap();
        assert!(hmm.is_cache_valid());
    }

    #[test]
    fn test_zero_classes_or_words_rejected() {
        assert!(matches!(
            HmmModel::new(&HmmConfig::new(0, 3)),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            HmmModel::new(&HmmConfig::new(3, 0)),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_initialize_requires_empty_model() {
        let (mut hmm, corpus, labels, mut rng) = trained(2, 6);
        assert!(matches!(
            hmm.initialize(&corpus, &labels, &mut rng),
            Err(Error::InvariantViolation { .. })
        ));
        let mut fresh = model(2, corpus.n_words());
        let short = Labels::from_vec(labels.as_slice()[1..].to_vec());
        assert!(fresh.initialize(&corpus, &short, &mut rng).is_err());
        fresh.check_empty().unwrap();
    }

    #[test]
    fn test_initialize_matches_sequential_adds() {
        let rng = &mut Pcg64Mcg::seed_from_u64(7);
        let corpus = small_corpus();
        let labels = Labels::random(&corpus, 3, rng).unwrap();
        let mut hmm = model(3, corpus.n_words());
        hmm.initialize(&corpus, &labels, rng).unwrap();
        let total_words: usize = corpus.sentences().iter().map(Vec::len).sum();
        let emitted: usize = (0..hmm.n_states())
            .map(|c| hmm.emission_dist(c).customer_count())
            .sum();
        let moved: usize = (0..hmm.n_states())
            .map(|c| hmm.transition_dist(c).customer_count())
            .sum();
        assert_eq!(emitted, total_words);
        assert_eq!(moved, total_words + corpus.len());
        assert_eq!(hmm.emission_dist(BOUNDARY).customer_count(), 0);
        assert_eq!(
            hmm.transition_dist(BOUNDARY).customer_count(),
            corpus.len()
        );
    }

    #[test]
    fn test_cache_tracks_every_mutation() {
        let (mut hmm, corpus, labels, mut rng) = trained(3, 8);
        assert!(!hmm.is_cache_valid());
        hmm.cache_probabilities();
        assert_cache_matches_restaurants(&hmm);

        hmm.remove_sentence(0, corpus.sentence(0), labels.get(0), &mut rng)
            .unwrap();
        assert!(!hmm.is_cache_valid());
        assert_eq!(hmm.cached_transition_prob(0, 1), None);
        let live = hmm.transition_dist(0).prob(1, 0.25);
        assert_eq!(hmm.transition_prob(0, 1), live);
        hmm.cache_probabilities();
        assert_cache_matches_restaurants(&hmm);

        hmm.add_sentence(0, corpus.sentence(0), labels.get(0), &mut rng)
            .unwrap();
        hmm.cache_probabilities();
        assert_cache_matches_restaurants(&hmm);

        hmm.sample_parameters(&mut rng).unwrap();
        assert!(hmm.is_cache_valid());
        assert_cache_matches_restaurants(&hmm);
    }

    #[test]
    fn test_forward_normalizes_over_all_sequences() {
        let (mut hmm, _, _, _) = trained(3, 9);
        let words = [0, 2, 1];
        for cached in [false, true] {
            if cached {
                hmm.cache_probabilities();
            }
            let forward = hmm.forward(&words, false).unwrap();
            assert_eq!(forward.len(), 3);
            let log_marginal = forward.log_marginal();
            assert_sums_to_one(
                words.len(),
                hmm.classes(),
                |labels| hmm.path_log_prob(&words, labels).unwrap() - log_marginal,
                1e-10,
            );
        }
    }

    #[test]
    fn test_sample_sentence_matches_exact_posterior() {
        let (hmm, _, _, mut rng) = trained(2, 10);
        let words = [1, 0, 2];
        let log_marginal = hmm.forward(&words, false).unwrap().log_marginal();
        let old_labels = [1, 1, 1];
        let mut new_labels = [0; 3];
        let sample = || {
            hmm.sample_sentence(0, &words, &old_labels, &mut new_labels, &mut rng)
                .unwrap();
            new_labels.to_vec()
        };
        let log_prob = |labels: &[usize]| hmm.path_log_prob(&words, labels).unwrap() - log_marginal;
        if let Some(message) =
            assert_goodness_of_fit(20000, words.len(), hmm.classes(), sample, log_prob, 0.001)
        {
            panic!("{}", message);
        }
    }

    #[test]
    fn test_sample_sentence_returns_path_probabilities() {
        let (hmm, _, _, mut rng) = trained(3, 11);
        let words = [3, 1, 0, 0];
        let old_labels = [2, 2, 1, 3];
        let mut new_labels = [0; 4];
        let (old_lp, new_lp) = hmm
            .sample_sentence(0, &words, &old_labels, &mut new_labels, &mut rng)
            .unwrap();
        assert!(new_labels.iter().all(|&c| (1..=3).contains(&c)));
        assert_eq!(old_lp, hmm.path_log_prob(&words, &old_labels).unwrap());
        assert_eq!(new_lp, hmm.path_log_prob(&words, &new_labels).unwrap());
    }

    #[test]
    fn test_sample_sentence_is_deterministic_given_seed() {
        let (hmm, corpus, labels, _) = trained(4, 12);
        let copy = hmm.clone();
        let words = corpus.sentence(4);
        let mut first = vec![0; words.len()];
        let mut second = vec![0; words.len()];
        let a = hmm
            .sample_sentence(4, words, labels.get(4), &mut first, &mut Pcg64Mcg::seed_from_u64(99))
            .unwrap();
        let b = copy
            .sample_sentence(4, words, labels.get(4), &mut second, &mut Pcg64Mcg::seed_from_u64(99))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_word_and_empty_sentences() {
        let (hmm, _, _, mut rng) = trained(3, 13);
        let mut new_labels = [0];
        let (old_lp, new_lp) = hmm
            .sample_sentence(0, &[2], &[1], &mut new_labels, &mut rng)
            .unwrap();
        assert!((1..=3).contains(&new_labels[0]));
        assert!(old_lp < 0.0 && new_lp < 0.0);
        let forward = hmm.forward(&[2], false).unwrap();
        assert_sums_to_one(
            1,
            3,
            |labels| hmm.path_log_prob(&[2], labels).unwrap() - forward.log_marginal(),
            1e-10,
        );

        let mut empty: [usize; 0] = [];
        let (old_lp, new_lp) = hmm
            .sample_sentence(0, &[], &[], &mut empty, &mut rng)
            .unwrap();
        assert_eq!(old_lp, new_lp);
        assert_eq!(old_lp, hmm.transition_prob(BOUNDARY, BOUNDARY).ln());
    }

    #[test]
    fn test_decode_finds_best_sequence() {
        let (hmm, _, _, _) = trained(3, 14);
        let words = [0, 3, 3, 1];
        let decoded = hmm.decode_sentence(&words).unwrap();
        let best = label_sequences(words.len(), hmm.classes())
            .into_iter()
            .map(|labels| {
                let lp = hmm.path_log_prob(&words, &labels).unwrap();
                (labels, lp)
            })
            .fold((Vec::new(), f64::NEG_INFINITY), |best, (labels, lp)| {
                if lp > best.1 {
                    (labels, lp)
                } else {
                    best
                }
            });
        assert_eq!(decoded, best.0);
        let forward = hmm.forward(&words, true).unwrap();
        assert!((forward.log_marginal() - best.1).abs() < 1e-10);
    }

    #[test]
    fn test_backward_step_rejects_zero_weights() {
        let hmm = model(2, 3);
        let forward = ForwardTable {
            n_states: 3,
            probs: vec![0.0; 6],
            log_marginal: 0.0,
        };
        let mut tags = [0; 2];
        let rng = &mut Pcg64Mcg::seed_from_u64(15);
        assert!(matches!(
            hmm.backward_step(&forward, &mut tags, Some(&mut *rng)),
            Err(Error::NumericalDegeneracy { position: 1 })
        ));
        // A zero-weight class is never chosen.
        let forward = ForwardTable {
            n_states: 3,
            probs: vec![0.0, 0.0, 1.0],
            log_marginal: 0.0,
        };
        let mut tags = [0; 1];
        for _ in 0..100 {
            hmm.backward_step(&forward, &mut tags, Some(&mut *rng))
                .unwrap();
            assert_eq!(tags[0], 2);
        }
    }

    #[test]
    fn test_backward_step_checks_buffer_length() {
        let (hmm, _, _, mut rng) = trained(2, 19);
        let forward = hmm.forward(&[0, 1, 2], false).unwrap();
        let mut tags = [0; 2];
        assert!(matches!(
            hmm.backward_step(&forward, &mut tags, Some(&mut rng)),
            Err(Error::LengthMismatch { words: 3, labels: 2 })
        ));
        assert!(matches!(
            hmm.backward_step::<Pcg64Mcg>(&forward, &mut [0; 4], None),
            Err(Error::LengthMismatch { words: 3, labels: 4 })
        ));
        assert_eq!(tags, [0, 0]);
    }

    #[test]
    fn test_clone_is_deep() {
        let (hmm, _, _, mut rng) = trained(2, 16);
        let mut copy = hmm.clone();
        let before = transition_customers(&hmm);
        copy.add_sentence(0, &[0, 1], &[1, 2], &mut rng).unwrap();
        assert_eq!(transition_customers(&hmm), before);
        assert_ne!(transition_customers(&copy), before);
    }

    #[test]
    fn test_sample_parameters_with_slice_sampler() {
        let rng = &mut Pcg64Mcg::seed_from_u64(17);
        let corpus = small_corpus();
        let mut config = HmmConfig::new(2, corpus.n_words());
        config.transition_prior.sampler = ParameterSampler::Slice;
        config.emission_prior.sampler = ParameterSampler::Slice;
        let mut hmm = HmmModel::new(&config).unwrap();
        let labels = Labels::random(&corpus, 2, rng).unwrap();
        hmm.initialize(&corpus, &labels, rng).unwrap();
        for _ in 0..20 {
            hmm.sample_parameters(rng).unwrap();
            for c in 0..hmm.n_states() {
                assert!(hmm.transition_dist(c).strength() > 0.0);
                assert!((0.0..1.0).contains(&hmm.emission_dist(c).discount()));
            }
        }
        assert_cache_matches_restaurants(&hmm);
    }
}
