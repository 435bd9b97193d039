//! Example batches of real text.
//!
//! Scale plots are only meaningful on realistic inputs, so the visualiser
//! feeds the model a batch of tokenized corpus text:
//!
//! - [`corpus`]: sharded text files streamed line by line, a seeded
//!   [`ShuffleBuffer`] and [`sample_sequences`];
//! - [`tokenize`]: the [`BatchTokenizer`] seam, a `tokenizers`-backed
//!   implementation and [`build_batch`] / [`example_batch`].

pub mod corpus;
pub mod tokenize;

pub use corpus::{
    sample_sequences, CorpusSource, CorpusStream, ShuffleBuffer, StreamingCorpus, TextCorpus,
};
pub use tokenize::{build_batch, example_batch, Batch, BatchTokenizer, PretrainedTokenizer};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error while reading corpus: {0}")]
    Io(#[from] std::io::Error),
    #[error("no shards matching '{pattern}' in {dir:?}")]
    NoShards { dir: PathBuf, pattern: String },
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("tokenizer has neither a pad nor an end-of-sequence token")]
    NoPadToken,
    #[error("only {found} of {wanted} sampled sequences have at least {min_length} chars")]
    NotEnoughSequences { wanted: usize, found: usize, min_length: usize },
}

pub type DataResult<T> = Result<T, DataError>;

/// Where example text comes from and how it is shuffled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExampleBatchConfig {
    /// Root directory of the dataset.
    pub path: PathBuf,
    /// Dataset configuration, a subdirectory of `path`.
    pub name: String,
    /// Shard file prefix inside `<path>/<name>`.
    pub split: String,
    pub shuffle_buffer: usize,
    pub seed: u64,
}

impl Default for ExampleBatchConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("wikitext"),
            name: "wikitext-103-v1".to_string(),
            split: "test".to_string(),
            shuffle_buffer: 10_000,
            seed: 1472,
        }
    }
}

impl ExampleBatchConfig {
    pub fn source(&self) -> CorpusSource {
        CorpusSource { path: self.path.clone(), name: self.name.clone(), split: self.split.clone() }
    }
}
