use std::sync::Arc;

use leafpds_core::config::PdsConfig;
use leafpds_core::traits::*;

use crate::firehose::relay::RelayNotifier;
use crate::firehose::sequencer::Sequencer;

#[derive(Clone)]
pub struct AppState<A, R, B>
where
    A: AccountStore,
    R: RepoStore,
    B: BlobStore,
{
    pub account_store: Arc<A>,
    pub repo_store: Arc<R>,
    pub blob_store: Arc<B>,
    pub config: Arc<PdsConfig>,
    /// Firehose event sequencer (None if firehose is disabled).
    pub sequencer: Option<Sequencer>,
    /// Relay notifier (None if no relay is configured).
    pub relay_notifier: Option<RelayNotifier>,
    /// Event store for firehose persistence (None if not configured).
    pub event_store: Option<Arc<dyn EventStore>>,
    /// Blob reference-count store, behind a trait object for the same
    /// reason `event_store` is: it doesn't vary per deployment the way
    /// `A`/`R`/`B` do, so it isn't worth a fourth generic parameter
    /// threaded through every route handler.
    pub blob_ref_store: Arc<dyn BlobRefStore>,
    /// OAuth authorization-server persistence (PAR/code/refresh-token rows).
    pub oauth_store: Arc<dyn OAuthStore>,
    /// OAuth authorization-server in-process state (signing key, CSRF
    /// cache, DPoP replay cache) that `oauth_store` deliberately excludes.
    pub oauth_runtime: Arc<crate::oauth_runtime::OAuthRuntime>,
}
