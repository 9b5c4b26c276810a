use crate::error::{Error, Result};
use crate::symbols::SymbolTable;

use rand::Rng;
use std::io::BufRead;

/// Word ids of one sentence.
pub type WordSent = Vec<usize>;

/// Class ids of one sentence, parallel to a `WordSent`.
pub type ClassSent = Vec<usize>;

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    sentences: Vec<WordSent>,
    symbols: SymbolTable,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A corpus of already encoded sentences, without a symbol table.
    pub fn from_sentences(sentences: Vec<WordSent>) -> Self {
        Self {
            sentences,
            symbols: SymbolTable::new(),
        }
    }

    /// Reads one whitespace tokenized sentence per non-empty line.
    pub fn from_reader<B: BufRead>(reader: B) -> Result<Self> {
        let mut corpus = Self::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            corpus.push_tokens(line.split_whitespace());
        }
        Ok(corpus)
    }

    pub fn push_tokens<'a>(&mut self, tokens: impl IntoIterator<Item = &'a str>) -> usize {
        let sentence: WordSent = tokens
            .into_iter()
            .map(|token| self.symbols.get_or_insert(token))
            .collect();
        self.sentences.push(sentence);
        self.sentences.len() - 1
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentence(&self, sid: usize) -> &[usize] {
        &self.sentences[sid][..]
    }

    pub fn sentences(&self) -> &[WordSent] {
        &self.sentences[..]
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Size of the word id space the model must cover.
    pub fn n_words(&self) -> usize {
        let from_sentences = self
            .sentences
            .iter()
            .flatten()
            .max()
            .map_or(0, |&w| w + 1);
        from_sentences.max(self.symbols.id_bound())
    }
}

/// The current class sequence of every sentence in a corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<ClassSent>);

impl Labels {
    pub fn from_vec(labels: Vec<ClassSent>) -> Self {
        Labels(labels)
    }

    /// Draws every label uniformly from `1..=classes`.
    pub fn random<R: Rng>(corpus: &Corpus, classes: usize, rng: &mut R) -> Result<Self> {
        if classes == 0 {
            return Err(Error::Configuration("No classes to label with".into()));
        }
        Ok(Labels(
            corpus
                .sentences()
                .iter()
                .map(|sentence| {
                    sentence
                        .iter()
                        .map(|_| rng.random_range(1..=classes))
                        .collect()
                })
                .collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, sid: usize) -> &[usize] {
        &self.0[sid][..]
    }

    pub fn get_mut(&mut self, sid: usize) -> &mut ClassSent {
        &mut self.0[sid]
    }

    pub fn as_slice(&self) -> &[ClassSent] {
        &self.0[..]
    }

    /// Checks that every sentence has one label per word.
    pub fn check_parallel(&self, corpus: &Corpus) -> Result<()> {
        if self.len() != corpus.len() {
            return Err(Error::LengthMismatch {
                words: corpus.len(),
                labels: self.len(),
            });
        }
        for (words, labels) in corpus.sentences().iter().zip(self.0.iter()) {
            if words.len() != labels.len() {
                return Err(Error::LengthMismatch {
                    words: words.len(),
                    labels: labels.len(),
                });
            }
        }
        Ok(())
    }
}
