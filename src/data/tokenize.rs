// --- File: src/data/tokenize.rs ---

//! Tokenization of sampled text into fixed-shape id batches.

use super::{sample_sequences, DataError, DataResult, ExampleBatchConfig};
use log::debug;
use ndarray::Array2;
use std::path::Path;
use tokenizers::Tokenizer;

/// What the batch builder needs from a tokenizer.
pub trait BatchTokenizer {
    fn encode(&self, text: &str) -> DataResult<Vec<i64>>;
    fn pad_token_id(&self) -> Option<i64>;
    fn set_pad_token_id(&mut self, id: i64);
    fn eos_token_id(&self) -> Option<i64>;
}

/// A `tokenizers` tokenizer loaded from a `tokenizer.json`.
pub struct PretrainedTokenizer {
    inner: Tokenizer,
    eos_token: Option<String>,
    pad_id: Option<i64>,
}

impl PretrainedTokenizer {
    /// Loads `path`. `eos_token` names the end-of-sequence token
    /// (`<|endoftext|>` for GPT-2 style vocabularies), if there is one.
    pub fn from_file(path: impl AsRef<Path>, eos_token: Option<&str>) -> DataResult<Self> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path).map_err(|err| {
            DataError::Tokenizer(format!("failed to load {}: {}", path.display(), err))
        })?;
        Ok(Self::new(inner, eos_token))
    }

    pub fn new(inner: Tokenizer, eos_token: Option<&str>) -> Self {
        let pad_id = inner.get_padding().map(|params| i64::from(params.pad_id));
        Self { inner, eos_token: eos_token.map(str::to_string), pad_id }
    }
}

impl BatchTokenizer for PretrainedTokenizer {
    fn encode(&self, text: &str) -> DataResult<Vec<i64>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|err| DataError::Tokenizer(format!("tokenization failed: {}", err)))?;
        Ok(encoding.get_ids().iter().map(|&id| i64::from(id)).collect())
    }

    fn pad_token_id(&self) -> Option<i64> {
        self.pad_id
    }

    fn set_pad_token_id(&mut self, id: i64) {
        self.pad_id = Some(id);
    }

    fn eos_token_id(&self) -> Option<i64> {
        let token = self.eos_token.as_deref()?;
        self.inner.token_to_id(token).map(i64::from)
    }
}

/// Token ids of one example batch, each of shape `(batch, seq_len)`.
///
/// `labels` are `input_ids` shifted left by one position.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
    pub labels: Array2<i64>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// Tokenizes `texts` into a [`Batch`].
///
/// Every sequence is truncated to `seq_len + 1` tokens and right-padded to
/// that length, so the shifted labels always exist. A tokenizer without a
/// pad token gets its end-of-sequence token as one.
pub fn build_batch<T: BatchTokenizer + ?Sized>(
    tokenizer: &mut T,
    texts: &[String],
    seq_len: usize,
) -> DataResult<Batch> {
    let pad = match tokenizer.pad_token_id() {
        Some(id) => id,
        None => {
            let eos = tokenizer.eos_token_id().ok_or(DataError::NoPadToken)?;
            tokenizer.set_pad_token_id(eos);
            eos
        }
    };

    let width = seq_len + 1;
    let mut ids = Array2::from_elem((texts.len(), width), pad);
    let mut mask = Array2::<i64>::zeros((texts.len(), width));
    for (row, text) in texts.iter().enumerate() {
        let tokens = tokenizer.encode(text)?;
        for (col, &token) in tokens.iter().take(width).enumerate() {
            ids[[row, col]] = token;
            mask[[row, col]] = 1;
        }
    }

    debug!("built batch of {} x {} tokens (pad id {})", texts.len(), seq_len, pad);
    Ok(Batch {
        input_ids: ids.slice(ndarray::s![.., ..seq_len]).to_owned(),
        attention_mask: mask.slice(ndarray::s![.., ..seq_len]).to_owned(),
        labels: ids.slice(ndarray::s![.., 1..]).to_owned(),
    })
}

/// Samples corpus text long enough to fill `seq_len` tokens (at least
/// `4 * seq_len` chars) and tokenizes it.
pub fn example_batch<T: BatchTokenizer + ?Sized>(
    tokenizer: &mut T,
    batch_size: usize,
    seq_len: usize,
    config: &ExampleBatchConfig,
) -> DataResult<Batch> {
    let corpus = config.source().open()?;
    let min_length = seq_len * 4;
    let texts =
        sample_sequences(&corpus, batch_size, min_length, config.shuffle_buffer, config.seed)?;
    build_batch(tokenizer, &texts, seq_len)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// One token per byte, id 0 reserved for end-of-sequence.
    pub(crate) struct ByteTokenizer {
        pub pad: Option<i64>,
    }

    impl BatchTokenizer for ByteTokenizer {
        fn encode(&self, text: &str) -> DataResult<Vec<i64>> {
            Ok(text.bytes().map(|b| i64::from(b) + 1).collect())
        }
        fn pad_token_id(&self) -> Option<i64> {
            self.pad
        }
        fn set_pad_token_id(&mut self, id: i64) {
            self.pad = Some(id);
        }
        fn eos_token_id(&self) -> Option<i64> {
            Some(0)
        }
    }

    struct NoSpecialTokens;

    impl BatchTokenizer for NoSpecialTokens {
        fn encode(&self, _text: &str) -> DataResult<Vec<i64>> {
            Ok(vec![1])
        }
        fn pad_token_id(&self) -> Option<i64> {
            None
        }
        fn set_pad_token_id(&mut self, _id: i64) {}
        fn eos_token_id(&self) -> Option<i64> {
            None
        }
    }

    #[test]
    fn short_sequences_are_padded_with_eos() {
        let mut tok = ByteTokenizer { pad: None };
        let texts = vec!["abcdef".to_string(), "ab".to_string()];
        let batch = build_batch(&mut tok, &texts, 4).unwrap();

        assert_eq!(tok.pad, Some(0));
        assert_eq!(batch.input_ids, array![[98i64, 99, 100, 101], [98, 99, 0, 0]]);
        assert_eq!(batch.attention_mask, array![[1i64, 1, 1, 1], [1, 1, 0, 0]]);
        assert_eq!(batch.labels, array![[99i64, 100, 101, 102], [99, 0, 0, 0]]);
        assert_eq!((batch.batch_size(), batch.seq_len()), (2, 4));
    }

    #[test]
    fn existing_pad_token_is_kept() {
        let mut tok = ByteTokenizer { pad: Some(-1) };
        let batch = build_batch(&mut tok, &["a".to_string()], 2).unwrap();
        assert_eq!(batch.input_ids, array![[98i64, -1]]);
        assert_eq!(batch.labels, array![[-1i64, -1]]);
        assert_eq!(tok.pad, Some(-1));
    }

    #[test]
    fn missing_pad_and_eos_is_an_error() {
        let err = build_batch(&mut NoSpecialTokens, &["x".to_string()], 3).unwrap_err();
        assert!(matches!(err, DataError::NoPadToken));
    }
}
