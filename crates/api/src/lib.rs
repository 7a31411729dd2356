//! HTTP API: configuration, request pipeline, authorization guards and
//! handlers.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod extract;
pub mod middleware;
