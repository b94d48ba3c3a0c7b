//! Shared credential primitives for the chat signaling backend.
//!
//! Only JWT handling lives here today: the signaling service validates bearer
//! tokens minted by the identity service, and tests mint their own.

pub mod jwt;

pub use jwt::{Claims, JwtError, JwtIssuer, JwtValidator};
