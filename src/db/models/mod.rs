//! Database models split into domain-specific modules.

pub mod login_code;
pub mod post;
pub mod user;

pub use login_code::*;
pub use post::*;
pub use user::*;
