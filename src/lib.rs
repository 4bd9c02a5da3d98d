//! Taskgate - Multi-tenant task tracking API with rights-based authorization
//!
//! Users reach domain objects only through rights granted by their roles.
//! The `taskgate` binary wraps this library with project setup,
//! administration commands and the HTTP server.

pub mod engine;
