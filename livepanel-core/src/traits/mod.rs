pub mod capture_provider;
pub mod encoder;
pub mod filter_gateway;
pub mod preference_store;
pub mod session_delegate;
