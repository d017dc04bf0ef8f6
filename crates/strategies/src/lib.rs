//! # Bandwatch Strategy Library
//!
//! This crate contains the trading logic of the bot: the indicator engine (RSI and
//! Bollinger Bands) and the hysteresis state machine that turns those indicators
//! into trade actions.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of APIs,
//!   notifications or execution. It depends only on `core-types` and `configuration`.
//! - **One transition function:** `RsiBbStrategy::step` is the single definition of
//!   the state machine. The live engine and the backtester both drive it, so a
//!   simulated run replays exactly what the bot would have done.
//! - **No partial mutation:** `step` works on a copy of `StrategyState` and hands back
//!   the successor; the caller commits it only when the step succeeded.
//!
//! ## Public API
//!
//! - `indicators`: `rsi`, `bollinger`, `RollingRsi`, `IndicatorFrame`.
//! - `RsiBbStrategy`: the state machine.
//! - `StrategyState`, `TradeAction`, `Transition`: its inputs and outputs.

// Declare all the modules that constitute this crate.
pub mod error;
pub mod indicators;
pub mod rsi_bb;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use indicators::{bollinger, rsi, Bands, FramePoint, IndicatorFrame, RollingRsi};
pub use rsi_bb::{FireTrigger, RsiBbStrategy, StrategyState, TradeAction, Transition};
