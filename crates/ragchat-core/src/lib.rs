//! # ragchat core
//!
//! Runtime-agnostic retrieval-augmented generation engine: data models,
//! fixed-window chunking, the embedder and vector store abstractions,
//! ingestion, retrieval, context assembly, session history, and answer
//! generation.
//!
//! This crate contains no sqlx, axum, reqwest, or other I/O-bound
//! dependencies. Concrete backends (SQLite, HTTP embedders, language-model
//! clients, PDF and HTML extraction) live in the `ragchat` app crate and
//! plug in through the traits defined here.
//!
//! ```text
//! write path:  raw text ─▶ chunk ─▶ Embedder ─▶ VectorStore
//! read path:   query ─▶ Embedder ─▶ VectorStore ─▶ Retriever
//!                    ─▶ context::assemble ─▶ AnswerGenerator ─▶ Answer
//! ```

pub mod acquire;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod session;
pub mod store;

pub use engine::RagEngine;
pub use error::{RagError, Result};
