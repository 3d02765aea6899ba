pub mod api;
pub mod ast;
pub mod desugar;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod matcher;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod utils;
pub mod value;
mod serialization;

pub use api::{load, load_named, Loaded};
pub use error::LoadError;
