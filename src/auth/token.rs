//! Token secrets, decoded claims, and issuance request/response shapes.

pub mod claims;
pub mod issued;
pub mod root_cert;
pub mod secret;
