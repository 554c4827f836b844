//! Govsim Runner - wires config, oracle and personas, and drives observations

pub mod config;
pub mod driver;
