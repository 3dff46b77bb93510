//! Token usage accounting.
//!
//! Each gateway call reports a [`Usage`]; the runner aggregates them over the
//! whole run and returns the sum on the final [`crate::Response`].

use serde::{Deserialize, Serialize};

/// Token usage for one or more completion calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt(s).
    pub prompt_tokens: usize,
    /// Tokens in the generated completion(s).
    pub completion_tokens: usize,
    /// Prompt + completion tokens.
    pub total_tokens: usize,
    /// Number of gateway calls accounted for.
    pub request_count: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_usage(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_totals() {
        let usage = Usage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(usage.request_count, 1);
    }

    #[test]
    fn test_add_usage_accumulates() {
        let mut total = Usage::empty();
        total.add_usage(&Usage::new(10, 5));
        total.add_usage(&Usage::new(20, 7));
        assert_eq!(total.prompt_tokens, 30);
        assert_eq!(total.completion_tokens, 12);
        assert_eq!(total.total_tokens, 42);
        assert_eq!(total.request_count, 2);
    }
}
