//! Generation parameters

use serde::{Deserialize, Serialize};

/// Sampling parameters for one generation call
///
/// A pure value. Backends read it per call and never store it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for sampling (0.0 = deterministic)
    pub temperature: f32,

    /// Top-p nucleus sampling
    pub top_p: f32,

    /// Top-k sampling (0 = disabled)
    pub top_k: u32,

    /// Repetition penalty (1.0 = none)
    pub repeat_penalty: f32,

    /// Random seed (None = backend default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Sequences that end generation, checked in order
    pub stop_sequences: Vec<String>,

    /// Request streamed output
    pub stream: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            seed: None,
            stop_sequences: vec!["</s>".to_string()],
            stream: false,
        }
    }
}

impl GenerationConfig {
    /// Cut `text` at the earliest occurrence of any stop sequence
    pub fn truncate_at_stop<'a>(&self, text: &'a str) -> &'a str {
        let cut = self
            .stop_sequences
            .iter()
            .filter(|s| !s.is_empty())
            .filter_map(|s| text.find(s.as_str()))
            .min();

        match cut {
            Some(idx) => &text[..idx],
            None => text,
        }
    }
}
