pub mod lenient;
pub mod text;
