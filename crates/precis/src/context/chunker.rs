//! Recursive chunking with a running synopsis.
//!
//! An oversized sequence is split into ordered chunks that each stay under
//! the chunk budget. Leading system messages that are small next to the
//! budget form a pinned prefix sent with every chunk, and their size is
//! charged against each chunk. A larger prefix is partitioned like any other
//! message. Before every chunk after the first, the provider condenses
//! the previous synopsis plus the previous chunk and its reply into a new
//! synopsis, which is prepended to the next chunk as a system message. The
//! final chunk's reply is the result. A chunked run of `n` chunks costs
//! `2n - 1` provider calls.

use tracing::debug;

use super::budget::ChunkBudget;
use crate::provider::{Completion, ProviderAdapter, SamplingParams};
use crate::{Message, MessageRole, SYNOPSIS_MAX_TOKENS, SummarizeError};

/// Temperature for synopsis calls.
pub const SYNOPSIS_TEMPERATURE: f32 = 0.3;

/// Prefix of the system message carrying the running synopsis.
pub const SYNOPSIS_HEADER: &str = "Synopsis of earlier content:";

/// A pinned system prefix may take at most `chunk_tokens / MAX_PINNED_SHARE`.
const MAX_PINNED_SHARE: usize = 4;

const SYNOPSIS_PROMPT: &str = "\
Condense the following material into a short synopsis that a reader can use \
as the only record of it.

Rules:
- Only include facts explicitly stated in the material. Do not infer.
- Preserve names, numbers and quoted terms verbatim.
- If there is an existing synopsis, merge the new material into it. The result \
  must be a single standalone synopsis that replaces the existing one.";

/// Splits oversized sequences and drives the per-chunk provider calls.
#[derive(Debug, Clone, Default)]
pub struct ContextChunker {
    budget: ChunkBudget,
}

impl ContextChunker {
    pub fn new(budget: ChunkBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &ChunkBudget {
        &self.budget
    }

    pub fn needs_chunking(&self, messages: &[Message]) -> bool {
        self.budget.needs_chunking(messages)
    }

    /// Partition `messages` into contiguous chunks, in order.
    ///
    /// A chunk closes when the next message would push it over the chunk
    /// budget. A message is never split; one that alone exceeds the budget
    /// becomes its own chunk.
    pub fn partition<'m>(&self, messages: &'m [Message]) -> Vec<&'m [Message]> {
        partition_within(&self.budget, messages, self.budget.chunk_tokens)
    }

    /// Split `messages` into the prefix sent with every chunk and the body
    /// to partition.
    ///
    /// Leading system messages are pinned when they leave a body to send and
    /// fit in a quarter of the chunk budget. Otherwise nothing is pinned.
    pub fn split_pinned<'m>(&self, messages: &'m [Message]) -> (&'m [Message], &'m [Message]) {
        let pinned = messages
            .iter()
            .take_while(|m| m.role == MessageRole::System)
            .count();
        let (prefix, body) = messages.split_at(pinned);
        let fits = self.budget.estimate(prefix) <= self.budget.chunk_tokens / MAX_PINNED_SHARE;
        if prefix.is_empty() || body.is_empty() || !fits {
            return (&messages[..0], messages);
        }
        (prefix, body)
    }

    /// Call the provider once, or chunk by chunk when the sequence is over
    /// the direct threshold.
    pub async fn run(
        &self,
        adapter: &dyn ProviderAdapter,
        messages: &[Message],
        params: &SamplingParams,
    ) -> Result<Completion, SummarizeError> {
        if !self.needs_chunking(messages) {
            return adapter.call(messages, params).await;
        }

        let (prefix, body) = self.split_pinned(messages);
        let limit = self
            .budget
            .chunk_tokens
            .saturating_sub(self.budget.estimate(prefix));
        let chunks = partition_within(&self.budget, body, limit);
        if chunks.is_empty() {
            return adapter.call(messages, params).await;
        }
        let total = chunks.len();
        debug!(
            "chunking ~{} tokens into {total} chunks ({} pinned messages)",
            self.budget.estimate(messages),
            prefix.len()
        );

        let synopsis_params = SamplingParams {
            temperature: SYNOPSIS_TEMPERATURE,
            max_tokens: SYNOPSIS_MAX_TOKENS,
        };
        let mut synopsis: Option<String> = None;
        let mut previous: Option<(&[Message], String)> = None;
        let mut last: Option<Completion> = None;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let index = i + 1;
            let wrap = |source: SummarizeError| SummarizeError::Chunking {
                index,
                total,
                source: Box::new(source),
            };

            if let Some((prev_chunk, prev_reply)) = previous.take() {
                let request = synopsis_request(synopsis.as_deref(), prev_chunk, &prev_reply);
                let condensed = adapter.call(&request, &synopsis_params).await.map_err(wrap)?;
                debug!(
                    "synopsis before chunk {index}/{total}: {} chars",
                    condensed.text.len()
                );
                synopsis = Some(condensed.text);
            }

            let mut outgoing = Vec::with_capacity(prefix.len() + chunk.len() + 1);
            outgoing.extend_from_slice(prefix);
            if let Some(s) = &synopsis {
                outgoing.push(Message::system(format!("{SYNOPSIS_HEADER}\n{s}")));
            }
            outgoing.extend_from_slice(chunk);

            debug!(
                "chunk {index}/{total}: {} messages, ~{} tokens",
                chunk.len(),
                self.budget.estimate(chunk)
            );
            let reply = adapter
                .call_large_context(&outgoing, params)
                .await
                .map_err(wrap)?;

            previous = Some((chunk, reply.text.clone()));
            last = Some(reply);
        }

        last.ok_or_else(|| SummarizeError::malformed(adapter.kind(), "no chunk was sent"))
    }
}

/// Greedy in-order partition with at most `limit` estimated tokens per
/// chunk, except for single messages that exceed it on their own.
fn partition_within<'m>(
    budget: &ChunkBudget,
    messages: &'m [Message],
    limit: usize,
) -> Vec<&'m [Message]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut acc = 0;
    for (i, message) in messages.iter().enumerate() {
        let size = budget.estimate_message(message);
        if i > start && acc + size > limit {
            chunks.push(&messages[start..i]);
            start = i;
            acc = 0;
        }
        acc += size;
    }
    if start < messages.len() {
        chunks.push(&messages[start..]);
    }
    chunks
}

/// Build the (system, user) pair asking for an updated synopsis.
fn synopsis_request(existing: Option<&str>, chunk: &[Message], reply: &str) -> Vec<Message> {
    let mut content = String::new();
    if let Some(existing) = existing {
        content.push_str("=== EXISTING SYNOPSIS ===\n");
        content.push_str(existing);
        content.push_str("\n\n=== NEW MATERIAL ===\n");
    }
    for msg in chunk {
        content.push_str(&format!("[{}]: {}\n\n", msg.role, msg.content));
    }
    content.push_str(&format!("[assistant]: {reply}\n"));
    vec![Message::system(SYNOPSIS_PROMPT), Message::user(content)]
}
