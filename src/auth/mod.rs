//! OAuth surface: the federated gateway and the approval cookie.

pub mod cookie;
pub mod gateway;

pub use gateway::{OAuthGatewayState, create_oauth_routes, generate_secret, request_origin};
