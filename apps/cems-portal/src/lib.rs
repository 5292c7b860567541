//! # cems-portal
//!
//! The CEMS Industry Registration Portal - THE BINARY.
//!
//! This crate wraps the `cems-core` wizard in:
//! - an axum JSON API with an in-memory session registry (`api`)
//! - a clap command line (`cli`)
//! - TOML + environment configuration (`config`)

pub mod api;
pub mod cli;
pub mod config;
