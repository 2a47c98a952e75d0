//! Natural-language querying over the relational store
//!
//! [`context`] renders table schemas for the generator, [`translator`] turns
//! questions into SQL through a [`TextGenerator`], and [`safety`] decides
//! whether a statement may run at all.

pub mod context;
pub mod generator;
pub mod hints;
pub mod safety;
pub mod translator;

pub use context::render;
pub use generator::{GenerationError, GenerationRequest, OpenAiGenerator, TextGenerator};
pub use hints::suggest_improvements;
pub use safety::{validate_read_only, ValidationError};
pub use translator::{fallback_questions, GeneratedQuery, QueryTranslator, TranslationError};
