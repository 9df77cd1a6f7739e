pub mod api;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod repository;
pub mod store;
pub mod trimmer;
