mod context;
mod gate;
mod middleware;
mod token;

pub use context::{AccessContext, Actor, Grant, resolve_role};
pub use gate::{authorize, require};
pub use middleware::Caller;
pub use token::{GeneratedToken, TokenGenerator, parse_token};
