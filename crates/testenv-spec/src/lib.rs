pub mod error;
pub mod parse;
pub mod validate;

pub use error::SpecError;
pub use parse::parse;
pub use validate::{early_validate, validate_rendered_network, TemplatedField, TemplatedFields};
