pub mod auth;
pub mod identity;
pub mod request_path;
pub mod resilience;
pub mod upstream;
