pub mod error;
pub mod path;
pub mod template;

pub use error::TemplateError;
pub use template::{PathEncoding, PromptTemplate};
