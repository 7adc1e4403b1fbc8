//! Authentication core and its endpoints.
//!
//! The leaf utilities (`hasher`, `tokens`, `lockout`, `jwt`) are pure; the
//! stores (`storage`, `session_store`) own SQL; `service` and `sessions`
//! orchestrate them; the remaining modules are the HTTP endpoints.

pub(crate) mod hasher;
pub mod jwt;
pub(crate) mod lockout;
pub(crate) mod oauth;
pub(crate) mod service;
pub(crate) mod session_store;
pub(crate) mod sessions;
pub mod state;
pub(crate) mod storage;
#[cfg(test)]
pub(crate) mod testutil;
pub(crate) mod tokens;
pub mod types;

pub mod federated;
pub mod login;
pub mod password;
pub mod register;
pub mod session;
pub mod verification;
