pub mod rotation;

pub use rotation::{generate_token, RotatorHandle, TokenRotator};
