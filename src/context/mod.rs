pub mod assembler;
pub mod commands;
pub mod context_model;
