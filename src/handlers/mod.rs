pub mod account;
pub mod public;
