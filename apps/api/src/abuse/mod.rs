// Abuse Guard: hashed-identifier block list plus rolling-window throttles for
// signups and bursts of freshly created accounts calling AI features.
// Raw IPs and device ids never leave this module unhashed.

pub mod fingerprint;
pub mod guard;
pub mod handlers;
pub mod hashing;
#[cfg(test)]
pub mod memory;
pub mod redis_store;
pub mod store;

pub use fingerprint::ClientFingerprint;
pub use guard::{AbuseGuard, GuardDecision};
