pub mod accessibility;
pub mod document;
