pub mod audio_models;
pub mod config;
pub mod error;
pub mod media;
pub mod preferences;
pub mod recording_result;
pub mod state;
