//! Core engine for Ace.
//!
//! Turns uploaded syllabi into a searchable index plus a concept graph and
//! answers questions from both. The building blocks live in `ace-index`
//! and `ace-providers`; this crate adds concept extraction, context
//! synthesis and the [`TutorService`] that ties them together.

pub mod document;
pub mod extractor;
pub mod prompts;
pub mod service;
pub mod synthesizer;

pub use document::{normalize, DocumentError, PlainTextExtractor, TextExtractor};
pub use extractor::{parse_concepts, ConceptExtractor, ExtractionError, DEFAULT_MAX_INPUT_CHARS};
pub use prompts::FALLBACK_ANSWER;
pub use service::{open_graph_store, Backends, ChatResponse, SyllabusResponse, TutorService};
pub use synthesizer::{ContextSynthesizer, HybridContext};
