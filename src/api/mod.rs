pub mod attendance;
pub mod location;
