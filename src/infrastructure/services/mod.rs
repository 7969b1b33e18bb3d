//! Infrastructure services

mod social_client;

pub use social_client::SocialClient;
