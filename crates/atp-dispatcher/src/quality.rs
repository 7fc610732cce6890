//! The Quality port a shadow run is scored against (spec §4.8 "its output
//! is scored by a Quality port but is not returned to the client"). Out of
//! scope for the core to implement — only the trait is defined here.

use async_trait::async_trait;

#[async_trait]
pub trait QualityPort: Send + Sync {
    async fn score(&self, prompt_tokens: u64, response_text: &str) -> f64;
}
