//! # quipu-nlu
//!
//! LLM-backed implementation of the [`Classifier`] trait over any
//! OpenAI-compatible chat-completions endpoint.
//!
//! [`Classifier`]: quipu_core::traits::Classifier

mod classifier;
mod prompts;

pub use classifier::LlmClassifier;
