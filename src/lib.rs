//! # Rubrik Exporter
//!
//! A Prometheus metrics exporter for Rubrik CDM clusters.
//!
//! ## Overview
//!
//! The exporter authenticates once against the appliance and, on every
//! scrape, reads each resource category through the GraphQL API, falling
//! back to the legacy REST API when GraphQL fails:
//!
//! - Cluster identity, storage capacity, runway and growth
//! - Node status, CPU, network, IOPS and throughput
//! - VMware, Nutanix and Hyper-V VM inventory and protection state
//! - Managed volumes, archive locations and archival bandwidth
//! - Protection task outcome counts from the canned task details report
//!
//! A category that cannot be read by either protocol is reported as empty
//! and flagged through the `rubrik_fetch_source` gauge.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rubrik_exporter::{client::RubrikClient, config::Settings, metrics::MetricsCollector, server::start_server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(Some("config/default.toml"))?;
//!
//!     let client = RubrikClient::connect(&settings.rubrik).await?;
//!     let metrics = MetricsCollector::new(std::sync::Arc::new(client))?;
//!
//!     start_server(&settings.exporter.listen_address, metrics, std::future::pending()).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The exporter can be configured via:
//! - TOML configuration file
//! - Environment variables (with `RUBRIK_EXPORTER_` prefix)
//! - Command-line arguments
//!
//! See [`config::Settings`] for details.
//!
//! ## Modules
//!
//! - [`client`] - Resource client with GraphQL-first, REST-fallback retrieval
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`graphql`] - GraphQL transport, query documents and response shapes
//! - [`metrics`] - Prometheus metrics definitions and collection
//! - [`models`] - Resource records shared by both protocols
//! - [`server`] - HTTP server for exposing metrics
//! - [`session`] - Authentication strategies
//! - [`transport`] - Authenticated REST transport

pub mod client;
pub mod config;
pub mod error;
pub mod graphql;
pub mod metrics;
pub mod models;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Result, RubrikError};
