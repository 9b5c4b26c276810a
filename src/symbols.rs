use crate::error::{Error, Result};

use std::collections::{HashMap, HashSet};

/// A bidirectional map between strings and dense ids.  Ids freed by
/// `remove` are handed out again before new ones are minted.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    ids: HashMap<String, usize>,
    symbols: Vec<Option<String>>,
    expired_ids: Vec<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self, symbol: &str) -> Option<usize> {
        self.ids.get(symbol).copied()
    }

    pub fn get_or_insert(&mut self, symbol: &str) -> usize {
        if let Some(id) = self.id(symbol) {
            return id;
        }
        let id = match self.expired_ids.pop() {
            Some(available_id) => {
                self.symbols[available_id] = Some(symbol.to_string());
                available_id
            }
            None => {
                self.symbols.push(Some(symbol.to_string()));
                self.symbols.len() - 1
            }
        };
        self.ids.insert(symbol.to_string(), id);
        id
    }

    pub fn symbol(&self, id: usize) -> Option<&str> {
        self.symbols.get(id).and_then(|s| s.as_deref())
    }

    /// Removes every id in `ids`.  If any of them is absent nothing is removed.
    pub fn remove(&mut self, ids: &[usize]) -> Result<()> {
        let unique: HashSet<usize> = ids.iter().copied().collect();
        if let Some(&missing) = unique.iter().find(|&&id| self.symbol(id).is_none()) {
            return Err(Error::UnknownSymbol(missing));
        }
        for id in unique {
            if let Some(symbol) = self.symbols[id].take() {
                self.ids.remove(&symbol);
                self.expired_ids.push(id);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// One more than the largest id ever handed out.
    pub fn id_bound(&self) -> usize {
        self.symbols.len()
    }
}
