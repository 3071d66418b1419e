// src/config.rs - configuration lives in relay_shared so every layer sees the same types
pub use relay_shared::config::*;
