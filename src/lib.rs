//! Protocol-abstracting, cache-aware, resilience-hardened NuGet package
//! client core.
//!
//! A [`client::Client`] wraps a [`repository::RepositoryManager`] of named
//! [`repository::SourceRepository`] instances, each of which lazily detects
//! and builds a [`protocol::ResourceProvider`] (v2 OData/Atom or v3 JSON)
//! through a shared [`factory::ProviderFactory`]. All network access runs
//! through [`transport::HttpClient`], which layers rate limiting, circuit
//! breaking, and retry over `reqwest`; results pass through a
//! [`cache::MultiTierCache`] before reaching the caller.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod observability;
pub mod persist;
pub mod protocol;
pub mod repository;
pub mod transport;
pub mod version;
