//! # Accesso (Multi-tenant Authentication Service)
//!
//! `accesso` handles user registration with email verification, password login
//! with account lockout, OAuth (Google/GitHub) federation, refresh-token
//! session management, password reset, and profile/account lifecycle.
//!
//! ## Tenant Model (Services)
//!
//! Every account belongs to exactly one service (tenant). The same email may
//! register independently under different services as distinct accounts; the
//! `(email, service)` pair is the uniqueness boundary.
//!
//! ## Credentials & Sessions
//!
//! Passwords are stored as Argon2id hashes. Verification, reset, and refresh
//! tokens are opaque random strings handed to the client exactly once; the
//! database only ever stores their SHA-256 digest. Refresh tokens are
//! single-use: every refresh rotates the stored session, and the superseded
//! token is rejected afterwards.
//!
//! ## Lockout
//!
//! Failed password checks increment a per-account counter; at the configured
//! threshold the account locks for a fixed window. The `locked_until`
//! timestamp is authoritative; the boolean flag is only a hint.

pub mod api;
pub mod cli;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
