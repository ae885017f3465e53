pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod demo;
pub mod error;
pub mod middleware;
pub mod server;
pub mod synthesis;
pub mod types;

#[cfg(test)]
pub mod testing;
