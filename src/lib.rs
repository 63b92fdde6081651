//! cnet-security - Request authentication and rate limiting for HTTP services
//!
//! This crate provides pluggable authentication chains, bearer tokens with
//! per-resource permissions, and fixed-window rate limits, all registered
//! on a [`SecurityContext`](context::SecurityContext) and enforced by an
//! axum middleware.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod exchange;
pub mod models;
pub mod ratelimit;
pub mod server;
pub mod telemetry;
