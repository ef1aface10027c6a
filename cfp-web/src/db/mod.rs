//! Database access for cfp-web
//!
//! Schema creation lives in `cfp_common::db`; these modules hold the
//! queries each part of the service needs.

pub mod content;
pub mod reviews;
pub mod sessions;
pub mod submissions;
pub mod users;
