pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::PdsConfig;
pub use error::{PdsError, PdsResult};
pub use traits::event_store::PersistedEvent;
pub use traits::{AccountStore, BlobRefStore, BlobStore, EventStore, OAuthStore, RepoStore};
pub use types::{
    AccountStatus, ActorAccount, BlobMeta, BlobRef, CreateAccountInput, EncryptedKey, KeyType,
    LoginProvider, MigrationTokenPayload, OAuthCode, OAuthCsrfToken, OAuthParRequest,
    OAuthRefreshToken, RefreshTokenRecord, RepoRoot,
};
