//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{Result, TallyError};
use crate::llm::huggingface::is_valid_token;
use crate::llm::{HuggingFaceClient, HuggingFaceConfig, LlmClient, LlmProvider, MockLlmClient};

/// Creates an LLM client from resolved LLM settings.
///
/// The Hugging Face provider needs a token starting with `hf_`, taken from
/// the config file or `HF_TOKEN`. The mock provider needs nothing.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider()? {
        LlmProvider::HuggingFace => {
            let token = config
                .token
                .as_deref()
                .filter(|t| is_valid_token(t))
                .ok_or_else(|| {
                    TallyError::llm(
                        "No Hugging Face token configured. Set HF_TOKEN (tokens start with hf_).",
                    )
                })?;
            let client = HuggingFaceClient::new(
                HuggingFaceConfig::new(token.trim())
                    .with_base_url(&config.base_url)
                    .with_timeout(config.timeout_secs),
            )?;
            Ok(Arc::new(client))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}
