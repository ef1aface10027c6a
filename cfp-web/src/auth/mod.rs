//! Authentication: password hashing, account tokens, sessions and the
//! request extractors built on them.

pub mod extract;
pub mod password;
pub mod session;
pub mod tokens;

pub use extract::{CurrentUser, MaybeUser, SessionToken};
pub use tokens::{decode_uid, encode_uid, TokenGenerator, ACCOUNT_ACTIVATION, PASSWORD_RESET};
