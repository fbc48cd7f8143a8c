//! Network side of the exchange: the [`Exchange`] seam and its HTTP
//! implementation.

pub mod exchange;

pub use exchange::{
    CompletionSender, Exchange, ExchangeConfig, ExchangeResult, HttpExchange, PendingExchange,
};
