pub mod assessment;
pub mod attendance;
pub mod core;
pub mod faculty;
pub mod resources;
pub mod students;

mod common;
