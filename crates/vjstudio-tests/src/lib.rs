//! Integration test crate for VJ Studio.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the vjstudio crates to verify they work together.

#[cfg(test)]
mod timeline;

#[cfg(test)]
mod playback;

#[cfg(test)]
mod invariants;
