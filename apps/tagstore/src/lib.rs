//! # tagstore
//!
//! Server and CLI layer over `tagstore-core`: the HTTP API, the command
//! line, TOML/env configuration, the per-user tagging service and the
//! best-effort remote mirror.

pub mod api;
pub mod cli;
pub mod config;
pub mod remote;
pub mod service;
pub mod telemetry;
