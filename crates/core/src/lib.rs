//! Core library for mastodon-to-bluesky
//!
//! This crate implements the **Functional Core** of the migration tool,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! The project uses a two-crate architecture to enforce separation of concerns:
//!
//! - **`mastodon_to_bluesky_core`** (this crate): data models and pure transformations
//! - **`mastodon-to-bluesky`**: HTTP clients, the transfer loop and the CLI (the Imperative Shell)
//!
//! ## Functional Core Principles
//!
//! - **Pure functions**: Mastodon statuses go in, Bluesky records come out
//! - **No network I/O**: the only side effect in this crate is reading and
//!   writing the transfer state file
//! - **Testable**: everything is tested with fixture data, no mock servers
//!
//! # Module Organization
//!
//! - [`mastodon`]: Mastodon REST API models, filtering and pagination cursors
//! - [`text`]: HTML to plain text conversion and thread splitting
//! - [`bluesky`]: AT Protocol record models, rich text facets and embeds
//! - [`transfer`]: Planning how a single status becomes a Bluesky thread
//! - [`state`]: The resumable transfer state file
//! - [`config`]: Credential resolution from flags, environment and config file
//! - [`backoff`]: Rate-limit retry delays
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use mastodon_to_bluesky_core::transfer::plan_status;
//!
//! let plan = plan_status(&status);
//!
//! assert_eq!(plan.chunks.len(), 1);
//! assert!(plan.images.len() <= 4);
//! ```

pub mod backoff;
pub mod bluesky;
pub mod config;
pub mod mastodon;
pub mod state;
pub mod text;
pub mod transfer;
