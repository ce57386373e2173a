pub mod components;
pub mod resources;
