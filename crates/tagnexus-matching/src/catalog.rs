// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use std::sync::Arc;
use tagnexus_discogs::{DiscogsClient, DiscogsError};
use tagnexus_domain::{CatalogQuery, CatalogRecord};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The service could not be reached or refused the request.
    #[error("catalog service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<DiscogsError> for CatalogError {
    fn from(error: DiscogsError) -> Self {
        CatalogError::ServiceUnavailable(error.to_string())
    }
}

/// A searchable catalog of releases. An empty result and an unavailable
/// service both mean "no candidate from this query" to the matcher.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogRecord>, CatalogError>;
}

#[async_trait]
impl CatalogSearch for DiscogsClient {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogRecord>, CatalogError> {
        Ok(self.search_releases(query).await?)
    }
}

#[async_trait]
impl<T: CatalogSearch + ?Sized> CatalogSearch for Arc<T> {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogRecord>, CatalogError> {
        (**self).search(query).await
    }
}
