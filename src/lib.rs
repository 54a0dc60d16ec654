//! # Iglu Resolver
//!
//! A multi-registry Iglu schema discovery and resolution engine.
//!
//! Iglu Resolver turns `iglu:vendor/name/format/version` references into
//! concrete schema documents, sourced from local workspace folders,
//! authenticated remote organizations, and public static repositories
//! (Iglu Central by default). Consumers query by partial descriptor —
//! vendor, name, registry, environment — and schema bodies are fetched
//! lazily, memoized per descriptor, and raced across equivalent sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Registries  │──▶│   Indexing    │──▶│ Query/Resolve │
//! │ ws/org/static│   │ descriptors  │   │ select + race │
//! └──────────────┘   └──────────────┘   └───────┬───────┘
//!                                               │
//!                             ┌─────────────────┤
//!                             ▼                 ▼
//!                       ┌──────────┐      ┌──────────┐
//!                       │   CLI    │      │ library  │
//!                       │  (iglu)  │      │ embedder │
//!                       └──────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! iglu registries                  # discover and list schema sources
//! iglu schemas --vendor com.acme   # list matching descriptors
//! iglu vendors                     # distinct vendors across sources
//! iglu resolve iglu:com.acme/checkout/jsonschema/1-0-0
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`uri`] | Iglu URI parsing, formatting, content addressing |
//! | [`model`] | Registries, schema descriptors, API wire formats |
//! | [`selector`] | Partial structural match patterns |
//! | [`service`] | Discovery, indexing, querying, lazy resolution |
//! | [`providers`] | Session/file/HTTP collaborator contracts |
//! | [`console`] | Organization API client |
//! | [`workspace`] | Workspace file enumeration and change polling |
//! | [`http`] | Plain JSON fetching |
//! | [`cancel`] | Cooperative cancellation |
//! | [`config`] | TOML configuration parsing |

pub mod cancel;
pub mod config;
pub mod console;
pub mod error;
pub mod http;
pub mod model;
pub mod providers;
pub mod selector;
pub mod service;
pub mod uri;
pub mod workspace;
