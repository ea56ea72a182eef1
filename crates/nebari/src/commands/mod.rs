pub mod deploy;
pub mod destroy;
pub mod render;
pub mod stages;
pub mod validate;
pub mod version;
