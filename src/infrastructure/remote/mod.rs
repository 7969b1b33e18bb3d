//! Remote service adapter for the hosted backend

mod http_client;
mod service;

pub use http_client::{HttpClient, HttpClientTrait};
pub use service::HttpRemoteService;
