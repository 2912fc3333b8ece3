//! Jupiter Adapter
//!
//! Implementation of the QuoteProvider port for the Jupiter aggregator.
//! Handles quote fetching and swap building; signing happens in the executor.

mod client;

pub use client::{JupiterClient, JupiterConfig};
