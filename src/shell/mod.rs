// Composition root.
//
// Reads configuration, wires the in-memory adapters into the use case handlers and exposes
// them over HTTP and GraphQL.

pub mod config;
pub mod graphql;
pub mod http;
pub mod http_errors;
pub mod identity;
pub mod state;
