//! mgraph-core - Domain types for the Microsoft Graph access layer
//!
//! This crate contains the HTTP-free half of the Graph client:
//! - **Error taxonomy** - `GraphError` with stable categories and recovery metadata
//! - **Request descriptors** - `GraphRequest`, the `$batch` envelope types
//! - **API version resolution** - `GraphApiVersion` plus path-based overrides
//! - **Intune catalogue** - typed constructors for common Intune endpoints
//! - **Ports** - the `TokenProvider` trait and `TelemetrySink` observer
//!
//! # Architecture
//!
//! The adapter crate (`mgraph-client`) layers rate limiting, retry, and the
//! actual HTTP transport on top of these types. Nothing in this crate performs
//! I/O; everything here is constructible and testable without a network.

pub mod auth;
pub mod config;
pub mod error;
pub mod intune;
pub mod request;
pub mod telemetry;
pub mod version;
