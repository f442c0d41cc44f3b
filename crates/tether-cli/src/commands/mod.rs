//! CLI command implementations.

pub mod hex_utils;
pub mod hexdump;
pub mod offsets;
pub mod run;
