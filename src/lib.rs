pub mod alerts;
pub mod allocation;
pub mod commands;
pub mod config;
pub mod context;
pub mod fetcher;
pub mod http;
pub mod models;
pub mod ranking;
pub mod scanner;
pub mod scoring;
pub mod store;
pub mod tickers;
