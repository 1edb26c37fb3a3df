//! Dataset loading, sanitizing and partitioning.

mod csv;
mod dataset;
mod partition;
mod record;
mod sanitized;

pub use self::csv::*;
pub use dataset::*;
pub use partition::*;
pub use record::*;
pub use sanitized::*;
