pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::sync::Arc;

use crate::infra::db::Db;
use crate::infra::email::Notifier;
use crate::infra::identity::IdentityResolver;
use crate::infra::repository::ReportRepository;
use crate::infra::storage::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub repository: Arc<dyn ReportRepository>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityResolver>,
    pub notifier: Arc<dyn Notifier>,
}
