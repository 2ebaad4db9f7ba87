//! Model-backed services
//!
//! Everything that talks to a language model lives here:
//! - **LLM client** (`llm`) - provider-agnostic completion trait with an
//!   HTTP implementation (OpenAI-compatible, Anthropic, Ollama) and a
//!   scripted test double
//! - **Classifier** (`classifier`) - free text → intent (+ optional target
//!   date)
//! - **Extractor** (`extractor`) - free text → structured event draft, with
//!   a distinguished "no date found" outcome
//! - **Resolver** (`resolver`) - deterministic disambiguation rules first,
//!   a model call only when they are inconclusive
//! - **Transcription** (`transcribe`) - voice notes → text
//!
//! Model output is strict-decoded JSON. Anything that does not decode fails
//! closed as `UpstreamError::MalformedModelOutput`; the orchestrator never
//! acts on a guess.

pub mod classifier;
pub mod extractor;
pub mod llm;
pub mod resolver;
pub mod transcribe;

pub use classifier::{ClassifierService, LlmClassifier};
pub use extractor::{Extraction, ExtractorService, LlmExtractor};
pub use llm::{HttpLlmClient, LlmClient, ScriptedLlmClient};
pub use resolver::{EventResolver, ResolverService};
pub use transcribe::{HttpTranscriptionService, ScriptedTranscription, TranscriptionService};
