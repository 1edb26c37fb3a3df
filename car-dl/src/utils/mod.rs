//! Misc utilities.

mod rate_counter;
#[cfg(test)]
pub(crate) mod testing;

pub use rate_counter::*;
