//! Core domain types and rules.

pub mod account;
pub mod admin;
pub mod challenge;
pub mod config_validation;
pub mod enrollment;
pub mod error;
pub mod profile;
pub mod progress;
