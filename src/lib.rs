// src/lib.rs
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod models;
pub mod paywall;
pub mod search;
pub mod store;
pub mod tier;
pub mod usage;
