//! metricboard: authenticated-client core for the metric dashboard.
//!
//! ARCHITECTURE
//! ============
//! A single [`session::SessionStore`] is written by the bootstrap step and
//! by auth-provider pushes. Two independent consumers read it:
//!
//! - [`guard::RouteGuard`] decides whether a protected view renders, waits,
//!   or redirects to the login route.
//! - [`binder::DataClientBinder`] mints a [`client::DataClient`] on demand
//!   and keeps its bearer token current.
//!
//! Every write through the data client is first checked against the entity
//! contracts in [`schema`].

pub mod auth;
pub mod binder;
pub mod client;
pub mod config;
pub mod guard;
pub mod schema;
pub mod session;

#[cfg(test)]
mod test_support;
