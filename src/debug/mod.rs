// src/debug/mod.rs

//! Debug and test helpers.

#[cfg(test)]
pub mod helpers;
pub mod printers;
