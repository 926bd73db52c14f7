pub mod bus;

pub use bus::{SessionEvent, TokenBus};
