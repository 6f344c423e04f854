//! API middleware stack.
//!
//! Execution order on protected routes (outermost → innermost):
//! 1. Auth validator: bearer token plus live user row
//! 2. Rate limiter: keyed by the verified user
//! 3. Audit logger: runs after auth, sees the user id
//!
//! Public routes run the rate limiter alone, keyed by peer address.

pub mod audit;
pub mod auth;
pub mod rate;
