//! Imagine server library.
//!
//! OAuth identity resolution and session handling, plus a text-to-image
//! job orchestrator that submits work to a hosted generation API and polls
//! it to completion.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
