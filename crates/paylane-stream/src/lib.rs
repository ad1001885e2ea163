//! Paylane Stream Accrual Engine
//!
//! A stream is a promise to pay `rate` value per second while its channel
//! is active and the stream itself is not paused. Accrual is computed
//! lazily at flush time; there is no per-stream timer.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::{FlushOutcome, StreamEngine};
pub use error::StreamError;
pub use types::{StopReason, Stream};
