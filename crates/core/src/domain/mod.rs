pub mod actor;
pub mod command;
pub mod intent;
pub mod world;
