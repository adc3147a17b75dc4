//! Token counting with model-appropriate BPE encoders
//!
//! Encoder objects are expensive to construct, so one per encoding kind is
//! cached for the process lifetime. If an encoder cannot be initialized
//! the counter falls back to a `ceil(chars/4)` estimate and flags the
//! result approximate instead of raising.

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

/// Per-message overhead: role marker plus start/end separators.
pub const MESSAGE_OVERHEAD: usize = 3;

/// One-time priming overhead for the assistant reply slot.
pub const ASSISTANT_PRIMING: usize = 3;

static CL100K: Lazy<Option<CoreBPE>> = Lazy::new(|| tiktoken_rs::cl100k_base().ok());
static P50K: Lazy<Option<CoreBPE>> = Lazy::new(|| tiktoken_rs::p50k_base().ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Cl100k,
    P50k,
}

/// Encoder selection by model family. Gemini has no public tokenizer, so
/// `cl100k_base` stands in as an approximation; unknown models get the
/// same treatment.
fn encoding_for_model(model: &str) -> Encoding {
    if model.starts_with("text-davinci") || model.starts_with("text-curie") {
        Encoding::P50k
    } else {
        // gpt-4*, gpt-3.5*, gemini*, and everything else
        Encoding::Cl100k
    }
}

/// A token count and whether it came from the chars/4 fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub tokens: usize,
    pub approximate: bool,
}

impl TokenCount {
    fn exact(tokens: usize) -> Self {
        Self {
            tokens,
            approximate: false,
        }
    }

    fn estimated(text: &str) -> Self {
        Self {
            tokens: text.chars().count().div_ceil(4),
            approximate: true,
        }
    }
}

fn encoder(encoding: Encoding) -> Option<&'static CoreBPE> {
    match encoding {
        Encoding::Cl100k => CL100K.as_ref(),
        Encoding::P50k => P50K.as_ref(),
    }
}

/// Count tokens in a string with the default encoder.
pub fn count_text(text: &str) -> TokenCount {
    count_with(Encoding::Cl100k, text)
}

/// Count tokens in a string with the encoder appropriate for `model`.
pub fn count_text_for_model(model: &str, text: &str) -> TokenCount {
    count_with(encoding_for_model(model), text)
}

fn count_with(encoding: Encoding, text: &str) -> TokenCount {
    match encoder(encoding) {
        Some(bpe) => TokenCount::exact(bpe.encode_with_special_tokens(text).len()),
        None => TokenCount::estimated(text),
    }
}

/// Count one chat message: content plus the per-message overhead plus the
/// optional name field's own tokens.
pub fn count_message(model: &str, content: &str, name: Option<&str>) -> TokenCount {
    let content_count = count_text_for_model(model, content);
    let name_count = name.map(|n| count_text_for_model(model, n));

    TokenCount {
        tokens: content_count.tokens
            + MESSAGE_OVERHEAD
            + name_count.map(|c| c.tokens).unwrap_or(0),
        approximate: content_count.approximate
            || name_count.map(|c| c.approximate).unwrap_or(false),
    }
}

/// Count a full message sequence, including the assistant priming tokens.
pub fn count_message_sequence<'a, I>(model: &str, messages: I) -> TokenCount
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut total = ASSISTANT_PRIMING;
    let mut approximate = false;
    for (content, name) in messages {
        let count = count_message(model, content, name);
        total += count.tokens;
        approximate |= count.approximate;
    }
    TokenCount {
        tokens: total,
        approximate,
    }
}
