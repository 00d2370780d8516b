pub mod report;
pub mod sessions;
