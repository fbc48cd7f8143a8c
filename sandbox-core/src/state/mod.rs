pub mod exchange;

pub use exchange::{Completion, ExchangeState, RecoveryPolicy};
