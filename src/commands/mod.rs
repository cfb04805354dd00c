pub mod inference;
pub mod status;
