pub mod moderators;
pub mod reports;
