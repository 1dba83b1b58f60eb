//! Incident controller process: configuration and the HTTP API

pub mod api;
pub mod config;
