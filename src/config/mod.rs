pub mod directives;
pub mod loader;
pub mod models;
pub mod validation;

pub use directives::{Directive, parse_directives};
pub use loader::{load_config, load_directive_file};
pub use models::*;
pub use validation::{ServerConfigValidator, ValidationError, ValidationResult};
