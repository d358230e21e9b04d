//! Pocketci Core
//!
//! Core types and abstractions for the Pocketci CI orchestrator.
//!
//! This crate contains:
//! - Domain types: Core business entities (events, pipelines, runs)
//! - DTOs: Data transfer objects for the control-plane API
//! - Glob matching with the `doublestar` semantics user pipelines rely on

pub mod domain;
pub mod dto;
pub mod glob;
