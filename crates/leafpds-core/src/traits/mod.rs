pub mod account_store;
pub mod blob_store;
pub mod event_store;
pub mod oauth_store;
pub mod repo_store;

pub use account_store::AccountStore;
pub use blob_store::{BlobRefStore, BlobStore};
pub use event_store::EventStore;
pub use oauth_store::OAuthStore;
pub use repo_store::RepoStore;
