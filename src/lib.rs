//! # RAG Gateway
//!
//! An OpenAI-compatible chat gateway with retrieval-augmented generation,
//! plus the indexing pipeline that feeds it.
//!
//! The gateway serves two HTTP surfaces from one process: a `/v1` chat API
//! that frontends such as Open WebUI speak natively, and a document
//! management API consumed by the indexing jobs. Chat requests are answered
//! by a configured LLM provider, grounded in document chunks retrieved from
//! a SQLite vector store and optionally extended with tools discovered from
//! MCP servers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌───────────┐
//! │   Storage    │──▶│  Indexing jobs   │──▶│  SQLite    │
//! │ local/rclone │   │ index/vec/reduce │   │ docs+vecs  │
//! └──────────────┘   └─────────────────┘   └─────┬─────┘
//!                                                │
//!                          ┌─────────────────────┤
//!                          ▼                     ▼
//!                    ┌───────────┐         ┌───────────┐
//!                    │ Documents │         │  /v1 chat  │
//!                    │    API    │         │ RAG + MCP │
//!                    └───────────┘         └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rgw init                      # create both databases
//! rgw serve                     # start the API server
//! rgw index                     # register files as documents
//! rgw vectorize                 # chunk + embed changed documents
//! rgw reduce                    # drop documents whose files vanished
//! rgw schedule                  # run all three jobs on intervals
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | YAML configuration parsing |
//! | [`models`] | Core data types |
//! | [`server`] | Chat + document HTTP API |
//! | [`auth`] | Credential strategies and workspace grants |
//! | [`rag`] | Retrieval-augmented chat orchestration |
//! | [`chat`] | LLM provider clients |
//! | [`retriever`] | Cosine-similarity retrieval over stored vectors |
//! | [`tools`] | Tool abstraction (retrieval + MCP) |
//! | [`mcp`] | JSON-RPC client for MCP servers |
//! | [`storage`] | Storage backend abstraction (local, rclone) |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider clients |
//! | [`index_job`] | File discovery job |
//! | [`vectorize_job`] | Chunk/embed/upload job |
//! | [`reduce_job`] | Garbage-collection job |
//! | [`scheduler`] | Interval scheduling for the jobs |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod api_types;
pub mod auth;
pub mod backend;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index_job;
pub mod markdown;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod rag;
pub mod reduce_job;
pub mod retriever;
pub mod sanitize;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod storage_local;
pub mod storage_rclone;
pub mod tools;
pub mod vectorize_job;
pub mod versions;
