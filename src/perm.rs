use rand::prelude::*;

/// The order in which sentences are visited during a sweep.
#[derive(Debug, Clone)]
pub struct Permutation {
    x: Vec<usize>,
}

impl Permutation {
    pub fn from_vector(x: Vec<usize>) -> Option<Self> {
        let mut y = x.clone();
        y.sort_unstable();
        if y.iter().enumerate().all(|(i, x)| *x == i) {
            Some(Self { x })
        } else {
            None
        }
    }

    pub fn natural(n_items: usize) -> Self {
        Self {
            x: (0..n_items).collect(),
        }
    }

    pub fn random<T: Rng>(n_items: usize, rng: &mut T) -> Self {
        let mut perm = Self::natural(n_items);
        perm.shuffle(rng);
        perm
    }

    pub fn get(&self, i: usize) -> usize {
        self.x[i]
    }

    pub fn shuffle<T: Rng>(&mut self, rng: &mut T) {
        self.x.shuffle(rng)
    }

    pub fn n_items(&self) -> usize {
        self.x.len()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.x[..]
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.x.iter().copied()
    }
}
