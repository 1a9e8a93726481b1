//! API route handlers

pub mod federate;
pub mod health;
pub mod upload;
