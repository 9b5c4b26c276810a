// Pitman-Yor restaurant

use crate::config::{HyperPrior, ParameterSampler};
use crate::error::{Error, Result};
use crate::index::{OutcomeIndex, Seating};
use crate::prelude::*;
use crate::slice::SliceSampler;

use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma};
use statrs::function::gamma::ln_gamma;

// Keeps slice sampling starting points off the boundary of the support.
const MIN_PARAMETER: f64 = 1e-6;

/// One Pitman-Yor restaurant with explicit table bookkeeping.  The base
/// measure is supplied by the caller on every query.
#[derive(Debug, Clone)]
pub struct PyDist<I: OutcomeIndex> {
    strength: Strength,
    discount: Discount,
    index: I,
    customers: usize,
    tables: usize,
}

impl<I: OutcomeIndex> PyDist<I> {
    pub fn new(strength: Strength, discount: Discount) -> Self {
        Self::with_outcomes(0, strength, discount)
    }

    pub fn with_outcomes(n_outcomes: usize, strength: Strength, discount: Discount) -> Self {
        Self {
            strength,
            discount,
            index: I::with_outcomes(n_outcomes),
            customers: 0,
            tables: 0,
        }
    }

    pub fn strength(&self) -> f64 {
        self.strength.unwrap()
    }

    pub fn discount(&self) -> f64 {
        self.discount.unwrap()
    }

    pub fn set_parameters(&mut self, strength: Strength, discount: Discount) {
        assert!(
            strength + discount.unwrap() > 0.0,
            "Strength must be greater than the negative of the discount."
        );
        self.strength = strength;
        self.discount = discount;
    }

    pub fn customer_count(&self) -> usize {
        self.customers
    }

    pub fn table_count(&self) -> usize {
        self.tables
    }

    pub fn seating(&self, outcome: usize) -> Option<&Seating> {
        self.index.seating(outcome)
    }

    pub fn customers_of(&self, outcome: usize) -> usize {
        self.seating(outcome).map_or(0, Seating::customers)
    }

    pub fn tables_of(&self, outcome: usize) -> usize {
        self.seating(outcome).map_or(0, Seating::n_tables)
    }

    pub fn seatings(&self) -> impl Iterator<Item = (usize, &Seating)> + '_ {
        self.index.seatings()
    }

    /// Predictive probability of `outcome` given base probability `base`.
    pub fn prob(&self, outcome: usize, base: f64) -> f64 {
        if self.customers == 0 {
            return base;
        }
        let d = self.discount.unwrap();
        let (c, t) = match self.seating(outcome) {
            Some(seating) => (seating.customers() as f64, seating.n_tables() as f64),
            None => (0.0, 0.0),
        };
        (c - d * t + (self.strength + d * (self.tables as f64)) * base)
            / (self.strength + self.customers as f64)
    }

    /// Seats a customer eating `outcome` and returns its predictive
    /// probability before it was seated.
    pub fn add<R: Rng>(&mut self, outcome: usize, base: f64, rng: &mut R) -> f64 {
        self.seat(outcome, base, rng).0
    }

    /// Like `add`, also returning the slot of the table the customer joined,
    /// which `unseat` accepts to undo exactly this customer.
    pub fn seat<R: Rng>(&mut self, outcome: usize, base: f64, rng: &mut R) -> (f64, usize) {
        let prob = self.prob(outcome, base);
        let d = self.discount.unwrap();
        let weight_of_new = (self.strength + d * (self.tables as f64)) * base;
        let seating = self.index.seating_mut(outcome);
        let weight_of_existing = seating.customers() as f64 - d * (seating.n_tables() as f64);
        let mut u = rng.random::<f64>() * (weight_of_existing + weight_of_new);
        let mut chosen = None;
        for (slot, size) in seating.tables() {
            u -= size as f64 - d;
            if u < 0.0 {
                chosen = Some(slot);
                break;
            }
        }
        let slot = match chosen {
            Some(slot) => {
                seating.join_table(slot);
                slot
            }
            None => {
                self.tables += 1;
                seating.open_table()
            }
        };
        self.customers += 1;
        (prob, slot)
    }

    /// Removes a uniformly chosen customer eating `outcome` and returns the
    /// predictive probability of `outcome` after its removal.
    pub fn remove<R: Rng>(&mut self, outcome: usize, base: f64, rng: &mut R) -> f64 {
        let seating = self.index.seating_mut(outcome);
        assert!(
            !seating.is_empty(),
            "Attempting to remove a customer for outcome {} which has none.",
            outcome
        );
        let mut u = rng.random_range(0..seating.customers());
        let mut chosen = 0;
        for (slot, size) in seating.tables() {
            if u < size {
                chosen = slot;
                break;
            }
            u -= size;
        }
        self.unseat(outcome, chosen, base)
    }

    /// Removes one customer eating `outcome` from table `slot` and returns
    /// the predictive probability of `outcome` after its removal.
    pub fn unseat(&mut self, outcome: usize, slot: usize, base: f64) -> f64 {
        let seating = self.index.seating_mut(outcome);
        assert!(
            seating.table_size(slot) > 0,
            "Attempting to unseat outcome {} from empty table {}.",
            outcome,
            slot
        );
        if seating.leave_table(slot) {
            self.tables -= 1;
        }
        self.customers -= 1;
        self.index.release(outcome);
        self.prob(outcome, base)
    }

    /// Log probability of the current seating arrangement under the given
    /// parameters, omitting the base measure terms.
    pub fn log_seating_likelihood(&self, strength: f64, discount: f64) -> f64 {
        if self.customers == 0 {
            return 0.0;
        }
        let mut result = ln_gamma(strength) - ln_gamma(strength + self.customers as f64);
        for i in 0..self.tables {
            result += (strength + discount * (i as f64)).ln();
        }
        let ln_gamma_one_minus_discount = ln_gamma(1.0 - discount);
        for (_, seating) in self.index.seatings() {
            for size in seating.table_sizes() {
                if size > 1 {
                    result += ln_gamma(size as f64 - discount) - ln_gamma_one_minus_discount;
                }
            }
        }
        result
    }

    pub fn sample_parameters<R: Rng>(&mut self, prior: &HyperPrior, rng: &mut R) -> Result<()> {
        match prior.sampler {
            ParameterSampler::Auxiliary => self.sample_parameters_auxiliary(prior, rng),
            ParameterSampler::Slice => {
                self.sample_parameters_slice(prior, rng);
                Ok(())
            }
        }
    }

    fn sample_parameters_auxiliary<R: Rng>(
        &mut self,
        prior: &HyperPrior,
        rng: &mut R,
    ) -> Result<()> {
        let s = self.strength.unwrap();
        let d = self.discount.unwrap();
        let mut sum_log_x = 0.0;
        if self.customers >= 2 {
            let beta = Beta::new(s + 1.0, (self.customers - 1) as f64)
                .map_err(|e| Error::Configuration(format!("strength auxiliary: {}", e)))?;
            sum_log_x += beta.sample(rng).ln();
        }
        let mut sum_y = 0.0;
        let mut sum_one_minus_y = 0.0;
        for i in 1..self.tables {
            if rng.random::<f64>() < s / (s + d * (i as f64)) {
                sum_y += 1.0;
            } else {
                sum_one_minus_y += 1.0;
            }
        }
        let mut sum_one_minus_z = 0.0;
        for (_, seating) in self.index.seatings() {
            for size in seating.table_sizes() {
                for j in 1..size {
                    let j = j as f64;
                    if rng.random::<f64>() >= (j - 1.0) / (j - d) {
                        sum_one_minus_z += 1.0;
                    }
                }
            }
        }
        let discount = Beta::new(
            prior.discount_a + sum_one_minus_y,
            prior.discount_b + sum_one_minus_z,
        )
        .map_err(|e| Error::Configuration(format!("discount posterior: {}", e)))?
        .sample(rng);
        let strength = Gamma::new(
            prior.strength_shape + sum_y,
            1.0 / (prior.strength_rate - sum_log_x),
        )
        .map_err(|e| Error::Configuration(format!("strength posterior: {}", e)))?
        .sample(rng);
        if let (Some(strength), Some(discount)) =
            (Strength::try_new(strength), Discount::try_new(discount))
        {
            self.strength = strength;
            self.discount = discount;
        }
        Ok(())
    }

    fn sample_parameters_slice<R: Rng>(&mut self, prior: &HyperPrior, rng: &mut R) {
        let d = self.discount.unwrap();
        let strength_sampler = SliceSampler::new(1.0, 32).with_bounds(0.0, f64::INFINITY);
        let (strength, _) = strength_sampler.sample(
            self.strength.unwrap().max(MIN_PARAMETER),
            |x| {
                (prior.strength_shape - 1.0) * x.ln() - prior.strength_rate * x
                    + self.log_seating_likelihood(x, d)
            },
            rng,
        );
        let discount_sampler = SliceSampler::new(0.1, 20).with_bounds(0.0, 1.0);
        let (discount, _) = discount_sampler.sample(
            d.clamp(MIN_PARAMETER, 1.0 - MIN_PARAMETER),
            |x| {
                (prior.discount_a - 1.0) * x.ln()
                    + (prior.discount_b - 1.0) * (1.0 - x).ln()
                    + self.log_seating_likelihood(strength, x)
            },
            rng,
        );
        if let (Some(strength), Some(discount)) =
            (Strength::try_new(strength), Discount::try_new(discount))
        {
            self.strength = strength;
            self.discount = discount;
        }
    }
}
