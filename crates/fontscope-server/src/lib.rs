//! HTTP front end for fontscope: configuration and routes.
//!
//! The `fontscope` binary wires these together; tests build the router
//! directly around a scanner of their choosing.

pub mod config;
pub mod routes;
