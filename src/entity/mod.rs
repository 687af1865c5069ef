//! SeaORM entity definitions.

pub mod refresh_token;
pub mod user;
