//! HTTP transport shared by external service clients

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
