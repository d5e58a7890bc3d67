//! Reference strategies

pub mod buy_and_hold;
pub mod print;

pub use buy_and_hold::BuyAndHold;
pub use print::PrintStrategy;
