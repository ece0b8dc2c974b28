//! Language model implementations.
//!
//! Reference implementation of the `LanguageModel` trait. Applications can
//! use it directly or implement their own.

mod openai;

pub use openai::OpenAiModel;
