pub mod accounts;
pub mod api;
pub mod clock;
pub mod config;
pub mod humanize;
pub mod kv;
pub mod observability;
pub mod provider;
pub mod stats;
