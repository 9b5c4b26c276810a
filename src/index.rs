use std::collections::HashMap;
use std::fmt::Debug;

/// The tables serving one outcome in a restaurant, as customers per table.
/// A table keeps its slot until it closes, so a customer can be unseated
/// from the exact table it joined; closed slots are reused last-in first-out.
#[derive(Debug, Clone, Default)]
pub struct Seating {
    tables: Vec<usize>,
    closed: Vec<usize>,
    customers: usize,
}

impl Seating {
    pub fn customers(&self) -> usize {
        self.customers
    }

    pub fn n_tables(&self) -> usize {
        self.tables.len() - self.closed.len()
    }

    /// Sizes of the open tables, keyed by slot.
    pub fn tables(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.tables
            .iter()
            .enumerate()
            .filter(|&(_, &size)| size > 0)
            .map(|(slot, &size)| (slot, size))
    }

    pub fn table_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.tables().map(|(_, size)| size)
    }

    /// Customers at table `slot`, zero if it is closed or never existed.
    pub fn table_size(&self, slot: usize) -> usize {
        self.tables.get(slot).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.customers == 0
    }

    /// Opens a table for one customer and returns its slot.
    pub(crate) fn open_table(&mut self) -> usize {
        self.customers += 1;
        match self.closed.pop() {
            Some(slot) => {
                self.tables[slot] = 1;
                slot
            }
            None => {
                self.tables.push(1);
                self.tables.len() - 1
            }
        }
    }

    pub(crate) fn join_table(&mut self, slot: usize) {
        debug_assert!(self.tables[slot] > 0);
        self.tables[slot] += 1;
        self.customers += 1;
    }

    /// Removes one customer from table `slot`; returns whether the table closed.
    pub(crate) fn leave_table(&mut self, slot: usize) -> bool {
        self.tables[slot] -= 1;
        self.customers -= 1;
        if self.customers == 0 {
            self.tables.clear();
            self.closed.clear();
            true
        } else if self.tables[slot] == 0 {
            self.closed.push(slot);
            true
        } else {
            false
        }
    }
}

// Two seatings are equal when the same slots hold the same open tables.
impl PartialEq for Seating {
    fn eq(&self, other: &Self) -> bool {
        self.customers == other.customers && self.tables().eq(other.tables())
    }
}

impl Eq for Seating {}

/// Storage of per-outcome seatings, shaped for the size of the outcome space.
pub trait OutcomeIndex: Debug + Clone {
    fn with_outcomes(n_outcomes: usize) -> Self;

    fn seating(&self, outcome: usize) -> Option<&Seating>;

    /// Creates an empty seating for `outcome` if there is none.
    fn seating_mut(&mut self, outcome: usize) -> &mut Seating;

    /// Drops the storage of `outcome` if it has no customers left.
    fn release(&mut self, outcome: usize);

    fn seatings<'a>(&'a self) -> Box<dyn Iterator<Item = (usize, &'a Seating)> + 'a>;
}

/// Vector-backed index for small outcome spaces (transitions between classes).
#[derive(Debug, Clone, Default)]
pub struct DenseIndex(Vec<Seating>);

impl OutcomeIndex for DenseIndex {
    fn with_outcomes(n_outcomes: usize) -> Self {
        DenseIndex(vec![Seating::default(); n_outcomes])
    }

    fn seating(&self, outcome: usize) -> Option<&Seating> {
        self.0.get(outcome)
    }

    fn seating_mut(&mut self, outcome: usize) -> &mut Seating {
        if outcome >= self.0.len() {
            self.0.resize(outcome + 1, Seating::default())
        }
        &mut self.0[outcome]
    }

    fn release(&mut self, _outcome: usize) {}

    fn seatings<'a>(&'a self) -> Box<dyn Iterator<Item = (usize, &'a Seating)> + 'a> {
        Box::new(self.0.iter().enumerate().filter(|(_, s)| !s.is_empty()))
    }
}

/// Hash-backed index for large outcome spaces (emissions of words).
#[derive(Debug, Clone, Default)]
pub struct SparseIndex(HashMap<usize, Seating>);

impl OutcomeIndex for SparseIndex {
    fn with_outcomes(_n_outcomes: usize) -> Self {
        SparseIndex(HashMap::new())
    }

    fn seating(&self, outcome: usize) -> Option<&Seating> {
        self.0.get(&outcome)
    }

    fn seating_mut(&mut self, outcome: usize) -> &mut Seating {
        self.0.entry(outcome).or_default()
    }

    fn release(&mut self, outcome: usize) {
        if self.0.get(&outcome).is_some_and(Seating::is_empty) {
            self.0.remove(&outcome);
        }
    }

    fn seatings<'a>(&'a self) -> Box<dyn Iterator<Item = (usize, &'a Seating)> + 'a> {
        Box::new(self.0.iter().map(|(&o, s)| (o, s)))
    }
}
