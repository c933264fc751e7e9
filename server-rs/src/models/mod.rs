pub mod content;
pub mod organization;
pub mod roster;
pub mod schedule;
