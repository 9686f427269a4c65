mod note;
mod user;

pub use note::{Note, NoteWithUser};
pub use user::{User, UserSummary};

/// Role labels used by the shop. The store accepts any non-empty label.
pub const ROLES: &[&str] = &["Employee", "Manager", "Admin"];

/// Role given to users created without an explicit role list
pub const DEFAULT_ROLE: &str = "Employee";
