pub mod export;
pub mod metadata;
pub mod preference_file;
