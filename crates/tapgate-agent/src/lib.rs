//! Tapgate reader agent library.

pub mod config;
pub mod presentation;
