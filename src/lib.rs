//! # Check Studio
//!
//! An AI-assisted generator of cloud security checks and fixers.
//!
//! Check Studio scans an existing inventory of security checks, indexes their
//! metadata as embeddings in SQLite, and uses retrieval-augmented generation
//! to draft new checks, remediation functions, and compliance mappings that
//! follow the conventions of the checks already in the tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Inventory  │──▶│ Vector Store │──▶│  SQLite   │
//! │ scan/diff  │   │ embed+search │   │ cos BLOBs │
//! └────────────┘   └──────┬───────┘   └──────────┘
//!                         │
//!            ┌────────────┴────────────┐
//!            ▼                         ▼
//!     ┌──────────────┐         ┌──────────────┐
//!     │ check        │         │ compliance   │
//!     │ creation     │         │ updater      │
//!     └──────┬───────┘         └──────┬───────┘
//!            ▼                         ▼
//!       ┌──────────┐             ┌──────────┐
//!       │   CLI    │             │   HTTP   │
//!       │ (studio) │             │   API    │
//!       └──────────┘             └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! studio build-check-rag ./prowler/providers   # index the check inventory
//! studio create-check "aws s3 buckets must block public access"
//! studio create-fixer s3_bucket_public_access
//! studio update-compliance ./cis_1.5_aws.json
//! studio serve api                             # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`inventory`] | Check tree scanning and diffing |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Persisted metadata vector store |
//! | [`llm`] | LLM completion model abstraction |
//! | [`prompts`] | Prompt template set |
//! | [`workflow`] | Check creation and compliance workflows |
//! | [`output`] | On-disk layout of generated checks |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod inventory;
pub mod llm;
pub mod models;
pub mod output;
pub mod prompts;
pub mod server;
pub mod store;
pub mod workflow;
