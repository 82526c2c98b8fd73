//! # contract-rag core
//!
//! Runtime-free logic shared by the `crag` CLI and HTTP server: text
//! normalization, token-window chunking, content-derived document identity,
//! the chunk store abstraction, similarity ranking, and clause-extraction
//! prompt assembly.
//!
//! This crate contains no tokio, sqlx, or network code. Every external
//! collaborator (text extractor, tokenizer, embedding model, generative
//! model, index store) sits behind a trait so the [`pipeline::Pipeline`]
//! can be exercised end to end with in-memory fakes.
//!
//! ```text
//! bytes ─▶ identify ─▶ duplicate? ─▶ extract ─▶ normalize ─▶ chunk ─▶ embed ─▶ insert
//! question ─▶ embed ─▶ scoped similarity search ─▶ top-k chunks ─▶ clause extractor
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod identity;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod retrieve;
pub mod store;
pub mod tokenizer;
