// Library exports for the binary, tests and benchmarks

mod atomic;

pub mod config;
pub mod error;
pub mod identity;
pub mod keys;
pub mod loader;
pub mod provision;
pub mod token;

#[cfg(test)]
pub mod test_utils;

pub use error::{KeyError, Result};
