//! # contract-rag
//!
//! Retrieval-augmented clause extraction over uploaded contracts.
//!
//! A contract is identified by the SHA-256 of its bytes, its extracted text
//! is normalized and split into overlapping token windows, each window is
//! embedded and stored, and questions are answered by extracting the clause
//! from the top-k most similar windows of that one contract.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────┐   ┌─────────────────┐
//! │ upload / CLI │──▶│ Pipeline (core crate)     │──▶│ SQLite or       │
//! │  PDF / DOCX  │   │ normalize → chunk → embed │   │ Elasticsearch   │
//! └──────────────┘   └─────────────┬────────────┘   └─────────────────┘
//!                                  │ ask
//!                                  ▼
//!                      retrieve top-k → generate (temperature 0)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`app`] | Build the shared pipeline from config |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite chunk store |
//! | [`elastic`] | Elasticsearch chunk store |
//! | [`embedding`] | OpenAI / Ollama embedding adapters |
//! | [`generation`] | OpenAI / Ollama clause extraction adapters |
//! | [`tokenizer`] | HuggingFace tokenizer loader |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`storage`] | Content-addressed upload storage |
//! | [`ingest`], [`ask`], [`get`] | CLI commands |
//! | [`server`] | HTTP server |

pub mod app;
pub mod ask;
pub mod config;
pub mod db;
pub mod elastic;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod retry;
pub mod server;
pub mod sqlite_store;
pub mod storage;
pub mod tokenizer;
