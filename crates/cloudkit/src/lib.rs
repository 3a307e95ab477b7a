//! # cloudkit
//!
//! The remote side of cloudsync: everything that talks to the management
//! API on behalf of the [`declarative`] engine.
//!
//! This crate provides:
//! - A [`Transport`] seam with an HTTP implementation and an in-memory
//!   emulator for tests
//! - A JSON [`Client`] that retries throttled calls
//! - An explicit [`ProviderContext`] passed to every operation
//! - The generic [`lifecycle`] (plan, create, read, update, delete, import)
//!   driven by a [`ResourceKind`]
//! - The `cloudfront_distribution` and `cosmosdb_account` kinds
//!
//! ## Example
//!
//! ```ignore
//! use cloudkit::{Client, HttpSettings, HttpTransport, ProviderContext, lifecycle, resources};
//! use std::sync::Arc;
//!
//! let transport = HttpTransport::new(HttpSettings::new("https://portal.example.net", token))?;
//! let ctx = ProviderContext::new(Client::new(Arc::new(transport)));
//!
//! let kind = resources::find("cosmosdb_account").unwrap();
//! let desired = kind.schema().decode(&document)?;
//! let entry = lifecycle::plan(&ctx, kind, "orders", &desired, None).await?;
//! let applied = lifecycle::apply(&ctx, kind, &entry, &desired).await?;
//! ```

pub mod client;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod resources;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::Client;
pub use context::ProviderContext;
pub use error::{Error, ErrorCategory, RATE_EXCEEDED, Result};
pub use lifecycle::{Applied, ResourceKind};
pub use retry::with_retry;
pub use transport::{Collection, HttpTransport, MemoryTransport, Method, Request, Response, Route, Transport};
pub use types::{HttpSettings, RetryConfig};
