//! Chat-completion integration for dreamweaver.
//!
//! [`CompletionClient`] posts the fixed two-message conversation to the
//! configured endpoint; [`ArtifactGenerator`] fans the request out N times
//! over one shared connection pool and persists every response as
//! `prompt<index>.json`.
//!
//! ```ignore
//! use dreamweaver::llm::ArtifactGenerator;
//!
//! let generator = ArtifactGenerator::from_config(&config)?;
//! for artifact in generator.generate().await? {
//!     println!("{} -> {}", artifact.index, artifact.path.display());
//! }
//! ```

pub mod completion;
pub mod generator;

pub use completion::{CompletionClient, CompletionRequest, Message};
pub use generator::{artifact_file_name, write_artifact, Artifact, ArtifactGenerator};
