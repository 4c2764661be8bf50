pub mod codec;
pub mod gain;
pub mod mixer;
pub mod monitor;
pub mod ring_buffer;
