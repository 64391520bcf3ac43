/// BERT WordPiece tokenizer built on the HuggingFace `tokenizers` crate.
///
/// Loads a plain `vocab.txt` (one token per line) and assembles the BERT
/// pipeline around it: lowercasing + accent stripping normalizer, BERT
/// pre-tokenizer, `##` WordPiece model and a `[CLS] … [SEP]` post-processor.
use std::path::Path;

use tokenizers::Tokenizer;
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;

use super::EmbedderError;

/// Longest sequence the encoder accepts. Longer input is cut, not windowed.
pub const MAX_SEQ_LEN: usize = 512;

const CLS_TOKEN: &str = "[CLS]";
const SEP_TOKEN: &str = "[SEP]";
const UNK_TOKEN: &str = "[UNK]";
const CONTINUING_SUBWORD_PREFIX: &str = "##";

/// Model-ready input for a single sequence.
///
/// All three vectors have the same length, at most [`MAX_SEQ_LEN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    pub input_ids: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    /// 1 for real tokens. No padding is ever added, so this is all ones.
    pub attention_mask: Vec<i64>,
}

impl EncodedInput {
    #[must_use]
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Cut all three sequences to the first `max_len` elements.
    fn truncate(&mut self, max_len: usize) {
        self.input_ids.truncate(max_len);
        self.token_type_ids.truncate(max_len);
        self.attention_mask.truncate(max_len);
    }
}

/// Wrapper around a WordPiece [`Tokenizer`] configured for uncased BERT models.
pub struct BertTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

impl BertTokenizer {
    /// Build the tokenizer from a `vocab.txt` file.
    pub fn from_vocab_file(vocab_path: &Path) -> Result<Self, EmbedderError> {
        if !vocab_path.exists() {
            return Err(EmbedderError::FileNotFound(format!(
                "vocabulary not found: {}",
                vocab_path.display()
            )));
        }

        let wordpiece = WordPiece::from_file(&vocab_path.to_string_lossy())
            .unk_token(UNK_TOKEN.to_string())
            .continuing_subword_prefix(CONTINUING_SUBWORD_PREFIX.to_string())
            .build()
            .map_err(|e| EmbedderError::Tokenizer(format!("failed to load vocabulary: {e}")))?;

        let mut inner = Tokenizer::new(wordpiece);

        let cls_id = special_token_id(&inner, CLS_TOKEN)?;
        let sep_id = special_token_id(&inner, SEP_TOKEN)?;
        special_token_id(&inner, UNK_TOKEN)?;

        // clean_text, handle_chinese_chars, strip_accents, lowercase
        inner.with_normalizer(Some(BertNormalizer::new(true, true, Some(true), true)));
        inner.with_pre_tokenizer(Some(BertPreTokenizer));
        inner.with_post_processor(Some(BertProcessing::new(
            (SEP_TOKEN.to_string(), sep_id),
            (CLS_TOKEN.to_string(), cls_id),
        )));

        Ok(Self {
            inner,
            max_length: MAX_SEQ_LEN,
        })
    }

    /// Tokenize `text` and produce ids, segment ids and attention mask.
    ///
    /// Boundary tokens are added before truncation, so input longer than
    /// [`MAX_SEQ_LEN`] loses its trailing `[SEP]` along with the excess.
    pub fn tokenize_and_encode(&self, text: &str) -> Result<EncodedInput, EmbedderError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| EmbedderError::Tokenizer(format!("failed to encode text: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| i64::from(t))
            .collect();
        let attention_mask = vec![1i64; input_ids.len()];

        let mut encoded = EncodedInput {
            input_ids,
            token_type_ids,
            attention_mask,
        };
        encoded.truncate(self.max_length);

        Ok(encoded)
    }

    /// Look up a token id, e.g. for tests or diagnostics.
    #[must_use]
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    /// Get the vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    /// Get the configured maximum sequence length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

fn special_token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32, EmbedderError> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| EmbedderError::Tokenizer(format!("vocabulary is missing {token}")))
}
