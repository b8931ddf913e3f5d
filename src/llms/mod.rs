//! LLM access.
//!
//! - [`base_llm`] - The trait every model backend implements
//! - [`providers`] - Concrete backends

pub mod base_llm;
pub mod providers;

pub use base_llm::{BaseLLM, BaseLLMState, LLMMessage, Role, UsageMetrics};
