// ==============================================================================
// lib.rs - Genetics Loader Library
// ==============================================================================
// Description: Library interface for catalog linking and case loading modules
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2025-11-21
// Version: 2.0.0
// ==============================================================================

pub mod builder;
pub mod case;
pub mod error;
pub mod federation;
pub mod link;
pub mod loader;
pub mod models;
pub mod parsers;
pub mod processor;
pub mod store;
pub mod transcripts;
