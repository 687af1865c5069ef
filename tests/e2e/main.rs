//! End-to-end test suite.
//!
//! Drives the HTTP surface against an in-memory SQLite database, with
//! wiremock standing in for the OAuth providers and the generation API.
//!
//! Run with: cargo test --test e2e


mod test_generations;
mod test_identity;
mod test_oauth_flow;
