//! # ragchat
//!
//! Chat with your PDFs, web pages, and notes. Documents are chunked,
//! embedded, and stored in SQLite; questions are answered by a language
//! model grounded in the most similar chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ PDF / URL / │──▶│  Pipeline   │──▶│  SQLite  │
//! │    text     │   │ Chunk+Embed │   │  chunks  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │ retrieve
//!                                          ▼
//!                   ┌──────────┐      ┌──────────┐
//!                   │ CLI/HTTP │◀─────│   LLM    │
//!                   └──────────┘      └──────────┘
//! ```
//!
//! The runtime-agnostic engine lives in `ragchat-core`; this crate wires it
//! to configuration, SQLite, HTTP backends, and the CLI/HTTP surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`app`] | Builds a `RagEngine` from configuration |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Persistent `VectorStore` |
//! | [`embedding`] | OpenAI, Ollama, and local embedders |
//! | [`llm`] | Groq, OpenAI, and Hugging Face generation backends |
//! | [`extract`] | PDF text extraction and web scraping |
//! | [`server`] | HTTP API |
//! | [`logging`] | `tracing` subscriber setup |

pub mod app;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
