//! Prompt resolution: raw text or a conversation in, provider-ready messages
//! and sampling parameters out.
//!
//! Pure functions, no state. A single user message is treated as raw content
//! and wrapped in the language's templates; any other sequence is a
//! conversation and passes through unchanged. Sampling parameters always come
//! from the language's template (custom first, then built-in default).

use crate::provider::SamplingParams;
use crate::{CustomPrompts, Language, Message, MessageRole, PromptTemplate};

/// Placeholder replaced with the content in user templates.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

const ENGLISH_SYSTEM: &str = "\
You are a precise summarization assistant. Produce a concise, factual summary \
of the content you are given.

Rules:
- Only include facts stated in the content. Do not infer or extrapolate.
- Keep names, numbers and quoted terms verbatim.
- Lead with the main point, then the supporting details as short bullet points.";

const ENGLISH_USER: &str = "Summarize the following content:\n\n{content}";

const CHINESE_SYSTEM: &str = "\
你是一个严谨的摘要助手。请用简体中文对给定内容生成简洁、准确的摘要。

规则：
- 只包含内容中明确陈述的事实，不要推断或引申。
- 人名、数字和引用的术语保持原样。
- 先写核心要点，再用简短的条目列出关键细节。";

const CHINESE_USER: &str = "请用简体中文总结以下内容：\n\n{content}";

/// Built-in template for one language.
#[derive(Debug, Clone, Copy)]
pub struct DefaultTemplate {
    pub system: &'static str,
    pub user: &'static str,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub fn default_template(language: Language) -> DefaultTemplate {
    match language {
        Language::English => DefaultTemplate {
            system: ENGLISH_SYSTEM,
            user: ENGLISH_USER,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        },
        Language::Chinese => DefaultTemplate {
            system: CHINESE_SYSTEM,
            user: CHINESE_USER,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        },
    }
}

/// Messages and sampling parameters ready for an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrompt {
    pub messages: Vec<Message>,
    pub params: SamplingParams,
}

/// Resolve a request's messages for `language`.
pub fn resolve(
    messages: &[Message],
    language: Language,
    custom: Option<&CustomPrompts>,
) -> ResolvedPrompt {
    match messages {
        [only] if only.role == MessageRole::User => resolve_text(&only.content, language, custom),
        _ => ResolvedPrompt {
            messages: messages.to_vec(),
            params: sampling_params(language, custom),
        },
    }
}

/// Wrap raw text in the system and user templates for `language`.
///
/// An empty custom system template suppresses the system message.
pub fn resolve_text(
    text: &str,
    language: Language,
    custom: Option<&CustomPrompts>,
) -> ResolvedPrompt {
    let defaults = default_template(language);
    let template = custom_template(language, custom);

    let system = template
        .and_then(|t| t.system.as_deref())
        .unwrap_or(defaults.system);
    let user = template
        .and_then(|t| t.user.as_deref())
        .unwrap_or(defaults.user);

    let mut messages = Vec::with_capacity(2);
    if !system.trim().is_empty() {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(interpolate(user, text)));

    ResolvedPrompt {
        messages,
        params: sampling_params(language, custom),
    }
}

/// Temperature and max tokens for `language`, custom values first.
pub fn sampling_params(language: Language, custom: Option<&CustomPrompts>) -> SamplingParams {
    let defaults = default_template(language);
    let template = custom_template(language, custom);
    SamplingParams {
        temperature: template
            .and_then(|t| t.temperature)
            .unwrap_or(defaults.temperature),
        max_tokens: template
            .and_then(|t| t.max_tokens)
            .unwrap_or(defaults.max_tokens),
    }
}

fn custom_template(language: Language, custom: Option<&CustomPrompts>) -> Option<&PromptTemplate> {
    custom.and_then(|c| c.get(&language))
}

fn interpolate(template: &str, content: &str) -> String {
    if template.contains(CONTENT_PLACEHOLDER) {
        template.replace(CONTENT_PLACEHOLDER, content)
    } else {
        format!("{template}\n\n{content}")
    }
}
