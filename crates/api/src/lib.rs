//! HTTP API: routing, bearer binding and request/response mapping.

pub mod app;
pub mod context;
pub mod middleware;
