//! Verification pipeline for generated photonic layouts.
//!
//! Orchestrates an external DRC tool run and an independent set of structural
//! geometry checks, merging both into a single pass/fail verdict with a
//! CI-friendly exit-code contract. Layout generation, rule decks, and CLI
//! wrappers are external collaborators.

pub mod config;
pub mod error;
pub mod layout;
pub mod verification;

pub(crate) mod log;
