pub mod keyring;

pub use keyring::resolve_secret;
