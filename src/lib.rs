//! # Ragnar
//!
//! A retrieval-augmented question-answering service over a local knowledge
//! directory.
//!
//! Ragnar turns a folder of mixed-format documents (plain text, Markdown,
//! PDF) into a persisted vector index, then answers questions through a
//! small agent graph that decides, per question, whether to consult the
//! index before generating a reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌─────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ VectorIndex │──┐
//! │ txt/md/  │   │ overlap │   │ build/load/ │  │
//! │   pdf    │   │ windows │   │   persist   │  │
//! └──────────┘   └─────────┘   └─────────────┘  │
//!                                               ▼
//!                 question ──▶ Router ──▶ Retrieve ──▶ Answer
//!                                 └───────direct────────▶ ▲
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragnar index                    # build and persist the vector index
//! ragnar query "What is the uniform policy?"
//! ragnar chat                     # interactive loop
//! ragnar serve                    # JSON HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | Extension-dispatched document loading |
//! | [`chunk`] | Overlapping-window text chunking |
//! | [`embedding`] | Embedding capability |
//! | [`llm`] | Classification and generation capability |
//! | [`index`] | Persisted nearest-neighbor index |
//! | [`retrieval`] | Index lifecycle and top-k retrieval |
//! | [`agent`] | Router/Retrieve/Answer orchestration |
//! | [`server`] | JSON HTTP API |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod loader;
pub mod models;
pub mod retrieval;
pub mod server;
