//! Remote service domain - the boundary to the hosted backend

mod service;

pub use service::RemoteService;

#[cfg(test)]
pub use service::MockRemoteService;
