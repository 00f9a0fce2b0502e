pub mod client;
pub mod http;
pub mod resilient;
pub mod resolver;
pub mod types;

pub use client::{IdentityClient, IdentityClientError};
pub use http::HttpIdentityClient;
pub use resilient::{IdentityServiceUnavailable, ResilientIdentityClient};
pub use resolver::{IdentityResolver, LocalIdentityResolver, RemoteIdentityResolver, ResolveError};
pub use types::{CallerIdentity, Cause, Extracted, Outage, TokenValidity, UserDetails};
