//! Request and response models for the SSO API.

pub mod requests;
pub mod responses;

pub use requests::*;
pub use responses::*;
