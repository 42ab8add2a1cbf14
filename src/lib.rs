//! syringe: secrets management over SSH.
//!
//! The server turns an authenticated SSH connection into a session that runs
//! through an ordered middleware [`middleware::Pipeline`] and is routed to
//! the caller's own tenant database. The client encodes one command per
//! connection and decrypts secret-bearing responses with the caller's key.

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod server;
pub mod services;
pub mod tenant;
pub mod types;
