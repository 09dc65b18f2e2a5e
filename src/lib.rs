// ABOUTME: Library module for account-export
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod archive;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod error;
pub mod export;
pub mod postgres;
pub mod utils;
