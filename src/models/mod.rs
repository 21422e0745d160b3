pub mod bid;
pub mod match_record;
pub mod session;
pub mod settlement;

pub use bid::*;
pub use match_record::*;
pub use session::*;
pub use settlement::*;

/// Micro-unit integer amount (no floating point anywhere in the money path).
pub type MicroUnits = u64;

/// Epoch milliseconds, as carried on the wire and compared throughout the core.
pub type TimestampMs = i64;
