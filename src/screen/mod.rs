pub mod inspector;
pub mod screen_model;
pub mod surveyor;
