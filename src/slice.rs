use rand::Rng;

// Shrinkage steps before giving up and keeping the current point.
const MAX_SHRINKS: u32 = 200;

/// Univariate slice sampler on the log scale using the stepping out and
/// shrinkage procedures, restricted to the open interval `(lower, upper)`.
#[derive(Debug, Clone, Copy)]
pub struct SliceSampler {
    width: f64,
    max_number_of_steps: u32,
    lower: f64,
    upper: f64,
}

impl SliceSampler {
    pub fn new(width: f64, max_number_of_steps: u32) -> Self {
        Self {
            width: if width <= 0.0 { f64::MIN_POSITIVE } else { width },
            max_number_of_steps,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Draws the next state given the current state `x` and an unnormalized
    /// log density `log_f`.  Returns the new state and the number of
    /// evaluations of `log_f`.
    pub fn sample<F: FnMut(f64) -> f64, R: Rng>(
        &self,
        x: f64,
        mut log_f: F,
        rng: &mut R,
    ) -> (f64, u32) {
        let mut evaluation_counter = 0;
        let mut f_with_counter = |x: f64| {
            evaluation_counter += 1;
            if x <= self.lower || x >= self.upper {
                f64::NEG_INFINITY
            } else {
                log_f(x)
            }
        };
        let fx = f_with_counter(x);
        if fx.is_nan() || fx == f64::INFINITY {
            return (x, evaluation_counter);
        }
        // Step 1 (slicing)
        let y = rng.random::<f64>().ln() + fx;
        // Step 2 (stepping out)
        let w = self.width;
        let mut l = x - rng.random::<f64>() * w;
        let mut r = l + w;
        let mut j = (rng.random::<f64>() * (self.max_number_of_steps as f64)).floor() as u32;
        let mut k = self.max_number_of_steps.saturating_sub(1 + j);
        while j > 0 && l > self.lower && y < f_with_counter(l) {
            l -= w;
            j -= 1;
        }
        while k > 0 && r < self.upper && y < f_with_counter(r) {
            r += w;
            k -= 1;
        }
        l = l.max(self.lower);
        r = r.min(self.upper);
        // Step 3 (shrinkage)
        for _ in 0..MAX_SHRINKS {
            let x1 = l + rng.random::<f64>() * (r - l);
            let fx1 = f_with_counter(x1);
            if y < fx1 {
                return (x1, evaluation_counter);
            }
            if x1 < x {
                l = x1;
            } else {
                r = x1;
            }
        }
        (x, evaluation_counter)
    }
}
