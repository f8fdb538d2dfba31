//! mgraph-client - Resilient Microsoft Graph HTTP client
//!
//! Provides the transport half of the Graph access layer:
//! - [`rate_limit`] - rolling-window quota tracking, proactive throttling,
//!   and retry/backoff math mirroring Intune Graph service limits
//! - [`client`] - the rate-limited request executor (admission, retry,
//!   error classification, telemetry)
//! - [`factory`] - ergonomic entry point binding a token provider to a
//!   configured executor, with pagination and `$batch` support
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mgraph_client::factory::GraphClientFactory;
//! use mgraph_core::auth::{AccessToken, StaticTokenProvider};
//! use mgraph_core::config::GraphClientConfig;
//! use mgraph_core::request::GraphRequest;
//!
//! # async fn example() -> Result<(), mgraph_core::error::GraphError> {
//! let provider = Arc::new(StaticTokenProvider::new(AccessToken {
//!     token: "access-token-here".to_string(),
//!     expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
//! }));
//! let config = GraphClientConfig::new(vec![
//!     "https://graph.microsoft.com/.default".to_string(),
//! ]);
//! let factory = GraphClientFactory::new(provider, config)?;
//! let devices = factory
//!     .request_json(GraphRequest::get("/deviceManagement/managedDevices"))
//!     .await?;
//! println!("{devices}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod rate_limit;
