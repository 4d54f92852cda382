//! productivity-api - Authenticated admin API for employee productivity records
//!
//! This crate provides an HTTP service where admins log in with stored
//! credentials, receive signed session tokens, and manage productivity
//! records backed by a pooled SQLite store.

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod server;
