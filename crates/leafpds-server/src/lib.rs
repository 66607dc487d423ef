pub mod auth;
pub mod error;
pub mod firehose;
pub mod oauth_runtime;
pub mod proxy;
pub mod routes;
pub mod state;

pub use auth::{AuthenticatedUser, JwtRefreshSecret, JwtSecret, OptionalAuth};
pub use firehose::relay::{RelayNotifier, RelayNotifierWorker};
pub use firehose::sequencer::Sequencer;
pub use oauth_runtime::OAuthRuntime;
pub use routes::build_router;
pub use state::AppState;
