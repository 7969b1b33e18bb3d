//! Infrastructure layer - Query cache, remote adapter and client services

pub mod logging;
pub mod query;
pub mod remote;
pub mod services;
