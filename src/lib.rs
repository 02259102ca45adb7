pub mod api;
pub mod config;
pub mod data_models;
pub mod elasticsearch;
pub mod error;
pub mod index;
pub mod query_engine;
