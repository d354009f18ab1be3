//! # Token budget
//!
//! Decides the `max_tokens` value of a chat-completion request so that the prompt
//! plus the answer fit inside the model's context window.
//!
//! Input tokens are counted with the `cl100k_base` BPE (tiktoken), which is close
//! enough for the local models this tool usually talks to. Each message costs an
//! extra [`MESSAGE_OVERHEAD_TOKENS`] for the role framing. If the tokenizer cannot
//! be loaded the count falls back to a character/word heuristic.
//!
//! ```text
//! available = context_limit - input_tokens - safety_margin
//! max_tokens = min(max_output_tokens, available)    // error if available < 256
//! ```

use tiktoken_rs::cl100k_base;
use tracing::{debug, warn};

use crate::{
    config::VocabularySettings,
    error::{Result, VocabularyError},
};

/// Smallest answer budget worth sending a request for.
pub const MIN_OUTPUT_TOKENS: usize = 256;

/// Per-message framing cost added to the BPE count.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Limits taken from [`VocabularySettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub context_limit: usize,
    pub max_output_tokens: usize,
    pub safety_margin: usize,
}

impl From<&VocabularySettings> for TokenBudget {
    fn from(settings: &VocabularySettings) -> Self {
        Self {
            context_limit: settings.context_limit,
            max_output_tokens: settings.max_output_tokens,
            safety_margin: settings.token_safety_margin,
        }
    }
}

/// Estimate the prompt size of `(role, content)` messages.
///
/// # Returns
/// Token count including [`MESSAGE_OVERHEAD_TOKENS`] per message; `0` for no messages.
pub fn estimate_input_tokens(messages: &[(&str, &str)]) -> usize {
    if messages.is_empty() {
        return 0;
    }
    let overhead = messages.len() * MESSAGE_OVERHEAD_TOKENS;
    let text = messages
        .iter()
        .map(|(role, content)| format!("role:{role}\n{content}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    match cl100k_base() {
        Ok(bpe) => bpe.encode_with_special_tokens(&text).len() + overhead,
        Err(err) => {
            warn!("Tokenizer unavailable, estimating token count: {}", err);
            heuristic_tokens(&text) + overhead
        }
    }
}

fn heuristic_tokens(text: &str) -> usize {
    let by_chars = text.chars().count().div_ceil(4);
    let by_words = (text.split_whitespace().count() as f64 * 1.3).ceil() as usize;
    by_chars.max(by_words)
}

/// Compute `max_tokens` for a request carrying `messages`.
///
/// # Errors
/// [`VocabularyError::InputTooLarge`] when fewer than [`MIN_OUTPUT_TOKENS`] would be
/// left for the answer.
pub fn calculate_max_tokens(messages: &[(&str, &str)], budget: TokenBudget) -> Result<usize> {
    let input_tokens = estimate_input_tokens(messages);
    let available = budget
        .context_limit
        .saturating_sub(input_tokens)
        .saturating_sub(budget.safety_margin);

    debug!(
        "Token budget: input {} / context {} (margin {}), available {}",
        input_tokens, budget.context_limit, budget.safety_margin, available
    );

    if available < MIN_OUTPUT_TOKENS {
        return Err(VocabularyError::InputTooLarge {
            input_tokens,
            context_limit: budget.context_limit,
            safety_margin: budget.safety_margin,
            available,
            minimum: MIN_OUTPUT_TOKENS,
        });
    }

    Ok(budget.max_output_tokens.min(available))
}
