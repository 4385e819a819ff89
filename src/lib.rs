//! # pdf-chat
//!
//! An admission-controlled PDF question-answering service.
//!
//! Clients upload a PDF, the service extracts its text, and natural-language
//! questions about that text are answered by a remote LLM. Every request
//! passes two admission stages — a process-wide concurrency gate and a
//! per-client sliding-window rate limiter — before any expensive work runs.
//! Retrieval is deliberately simple: fixed-size word-preserving chunks with
//! keyword (substring) matching, a stand-in for vector search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌─────────────────┐
//! │  HTTP    │──▶│  RequestPipeline       │──▶│  Collaborators   │
//! │  (axum)  │   │  gate → limiter → work │   │  PDF / LLM / fs  │
//! └──────────┘   └──────────┬────────────┘   └─────────────────┘
//!                           │
//!                ┌──────────┴──────────┐
//!                ▼                     ▼
//!          ┌──────────┐         ┌────────────┐
//!          │ chunker  │────────▶│ retriever   │
//!          └──────────┘         └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`limiter`] | Per-client sliding-window rate limiting |
//! | [`gate`] | In-flight request concurrency ceiling |
//! | [`chunk`] | Word-boundary text chunking |
//! | [`retriever`] | Keyword chunk retrieval |
//! | [`extract`] | PDF text extraction |
//! | [`store`] | JSON document persistence |
//! | [`llm`] | Remote LLM client |
//! | [`pipeline`] | Admission-controlled request pipeline |
//! | [`server`] | HTTP API |

pub mod chunk;
pub mod config;
pub mod extract;
pub mod gate;
pub mod limiter;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod server;
pub mod store;
