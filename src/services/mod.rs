//! Business logic shared by the HTTP handlers.

pub mod crud;
pub mod login_codes;
pub mod posts;
pub mod users;

pub use crud::{CrudService, Page, Resource};
pub use login_codes::{generate_code, LoginCodeError, LoginCodeService};
pub use posts::Posts;
pub use users::{UserError, UserService};
