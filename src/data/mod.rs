mod credentials;
mod loader;

pub use credentials::{AccountStore, CredentialStore};
pub use loader::{load_questions_from_path, parse_questions};
