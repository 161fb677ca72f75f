//! Pipeline configuration read from the environment.

/// Fixed generation parameters; not read from the environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

pub const GENERATION_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.0,
    top_p: 0.1,
    max_tokens: 220,
};

pub const DEFAULT_RETRIEVAL_TOP_K: usize = 2;
pub const DEFAULT_CHAT_SUMMARY_LIMIT: usize = 2;
pub const DEFAULT_MEMORY_SNIPPET_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Include the literal question text in audit events.
    pub store_raw_question: bool,
    pub retrieval_top_k: usize,
    pub chat_summary_limit: usize,
    pub memory_snippet_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_raw_question: false,
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
            chat_summary_limit: DEFAULT_CHAT_SUMMARY_LIMIT,
            memory_snippet_limit: DEFAULT_MEMORY_SNIPPET_LIMIT,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let count = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(default)
        };
        Self {
            store_raw_question: lookup("TWIN_STORE_RAW_QUESTION")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(defaults.store_raw_question),
            retrieval_top_k: count("TWIN_RETRIEVAL_TOP_K", defaults.retrieval_top_k),
            chat_summary_limit: count("TWIN_CHAT_SUMMARY_LIMIT", defaults.chat_summary_limit),
            memory_snippet_limit: count("TWIN_MEMORY_SNIPPET_LIMIT", defaults.memory_snippet_limit),
        }
    }
}
