pub mod config;
pub mod errors;
pub mod install;

pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use install::{Installation, OAuthState, TeamId, UserId, OAUTH_STATE_TTL_MINUTES};
