pub mod config;
pub mod corpus;
pub mod error;
pub mod gibbs;
pub mod hmm;
pub mod index;
pub mod model;
pub mod perm;
pub mod prelude;
pub mod pyp;
pub mod slice;
pub mod symbols;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
