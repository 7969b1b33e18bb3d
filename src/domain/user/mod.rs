//! User domain
//!
//! Profiles, registration and sign-in requests, and sessions.

mod entity;

pub use entity::{NewUser, Session, SignInCredentials, UpdateUser, User, UserId};
