pub mod loader;
pub mod settings;

pub use loader::{apply_cli_overrides, load};
pub use settings::*;
