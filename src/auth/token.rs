//! Token secrets plus the shared and local token records.

pub mod record;
pub mod secret;
