pub mod factory;
pub mod filter;
pub mod issuer;
pub mod token;

pub use factory::{AuthStack, build_auth_stack};
pub use filter::{
    AuthFilter, AuthRejection, Decision, FilterError, PublicEndpoints, USER_EMAIL_HEADER,
    USER_ID_HEADER, derive_request,
};
pub use issuer::TokenIssuer;
pub use token::{BEARER_PREFIX, BearerToken, TokenClaims, TokenVerifier, VerificationError};
