pub mod assignments;
pub mod catalog;
pub mod core;
pub mod maintenance;
pub mod promotions;
pub mod students;
