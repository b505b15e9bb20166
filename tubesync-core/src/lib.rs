//! Tubesync Core
//!
//! Core types shared by the Tubesync client crates.
//!
//! This crate contains:
//! - Domain types: jobs, recent downloads, save progress, task locks
//! - DTOs: wire shapes of the backend REST surface and the push channel

pub mod domain;
pub mod dto;
