pub mod models;
pub mod sessions;
pub mod settings;
