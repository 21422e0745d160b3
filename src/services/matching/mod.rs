//! Attention-matching core (§4).
//!
//! Three pure structures — `OrderBook`, `SessionPool`, `RuleEngine` — owned
//! outright by a single `Matcher` actor task, which is the only mutator of
//! any of them (§5).

pub mod errors;
pub mod matcher;
pub mod order_book;
pub mod rule_engine;
pub mod session_pool;

pub use errors::{BookError, PoolError};
pub use matcher::{Command, Matcher, MatcherConfig};
pub use order_book::OrderBook;
pub use rule_engine::{EnforcerConfig, RuleEngine, Rejection};
pub use session_pool::SessionPool;
