pub mod composer;
pub mod context;
pub mod devices;
pub mod filter;
pub mod recorder;
