//! The provider seam the coordinator fans out over.

use async_trait::async_trait;
use georm_proto::{QueryRequest, Record};

use crate::error::Error;

/// One backend able to answer an object query.
///
/// Providers own their connections; the coordinator only calls
/// [`QueryProvider::query`] once per federated request.
#[async_trait]
pub trait QueryProvider: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<Record>, Error>;
}
