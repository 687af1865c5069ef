//! Request authentication via the session cookie.

mod extractor;

pub use extractor::SessionUser;
