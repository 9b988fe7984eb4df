//! Size estimation for message sequences.
//!
//! Estimates are character based (`chars / chars_per_token`, rounded up per
//! message). They decide between a direct call and a chunked one and bound
//! each chunk; they are not an exact token count.

use crate::Message;

/// Default characters per token.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// At or above this many estimated tokens a sequence is chunked.
pub const DEFAULT_DIRECT_THRESHOLD_TOKENS: usize = 100_000;

/// Target upper bound for one chunk's estimated tokens.
pub const DEFAULT_CHUNK_TOKENS: usize = 50_000;

/// Estimated tokens for `text`.
pub fn estimate_tokens(text: &str, chars_per_token: f64) -> usize {
    let cpt = if chars_per_token > 0.0 {
        chars_per_token
    } else {
        DEFAULT_CHARS_PER_TOKEN
    };
    (text.chars().count() as f64 / cpt).ceil() as usize
}

/// Thresholds for the direct-versus-chunked decision.
///
/// # Example
///
/// ```ignore
/// let budget = ChunkBudget::default()
///     .with_direct_threshold_tokens(8_000)
///     .with_chunk_tokens(4_000);
/// assert!(budget.needs_chunking(&messages));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkBudget {
    pub chars_per_token: f64,
    pub direct_threshold_tokens: usize,
    pub chunk_tokens: usize,
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            direct_threshold_tokens: DEFAULT_DIRECT_THRESHOLD_TOKENS,
            chunk_tokens: DEFAULT_CHUNK_TOKENS,
        }
    }
}

impl ChunkBudget {
    pub fn with_chars_per_token(mut self, cpt: f64) -> Self {
        self.chars_per_token = cpt;
        self
    }

    pub fn with_direct_threshold_tokens(mut self, tokens: usize) -> Self {
        self.direct_threshold_tokens = tokens;
        self
    }

    pub fn with_chunk_tokens(mut self, tokens: usize) -> Self {
        self.chunk_tokens = tokens;
        self
    }

    pub fn estimate_message(&self, message: &Message) -> usize {
        estimate_tokens(&message.content, self.chars_per_token)
    }

    pub fn estimate(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }

    pub fn needs_chunking(&self, messages: &[Message]) -> bool {
        self.estimate(messages) >= self.direct_threshold_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up_per_message() {
        assert_eq!(estimate_tokens("", 4.0), 0);
        assert_eq!(estimate_tokens("abcd", 4.0), 1);
        assert_eq!(estimate_tokens("abcde", 4.0), 2);

        let budget = ChunkBudget::default();
        let messages = vec![Message::user("abcde"), Message::assistant("a")];
        assert_eq!(budget.estimate(&messages), 3);
    }

    #[test]
    fn estimate_counts_chars_not_bytes() {
        // Four CJK characters are twelve bytes.
        assert_eq!(estimate_tokens("摘要内容", 4.0), 1);
    }

    #[test]
    fn nonpositive_ratio_falls_back_to_default() {
        assert_eq!(estimate_tokens("abcdefgh", 0.0), 2);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let budget = ChunkBudget::default().with_direct_threshold_tokens(10);
        assert!(!budget.needs_chunking(&[Message::user("x".repeat(36))]));
        assert!(budget.needs_chunking(&[Message::user("x".repeat(40))]));
    }
}
