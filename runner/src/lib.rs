//! nanofolio-runner: batch driver for nanofolio.
//!
//! Loads a TOML config and a JSON price file, runs one forecast-and-allocate
//! cycle (or a backfill over past dates), and appends the results to a JSON
//! Lines file, one record per as-of date.

pub mod backfill;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod prices;
