//! Query-time retrieval over a built `DocumentIndex`.

use super::index::{DocumentIndex, IndexService};
use crate::error::ChatError;
use crate::protocol::ScoredChunk;

pub struct Retriever {
    service: IndexService,
}

impl Retriever {
    pub fn new(service: IndexService) -> Self {
        Self { service }
    }

    /// The `k` chunks most similar to `query`, best first.
    pub async fn retrieve(
        &self,
        query: &str,
        index: Option<&DocumentIndex>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, ChatError> {
        let index = index.ok_or(ChatError::IndexUnavailable)?;
        if k == 0 {
            return Err(ChatError::configuration("top_k must be at least 1"));
        }
        let vector = self.service.embed_query(query).await?;
        let results = index.query(&vector, k);
        tracing::debug!(
            k,
            returned = results.len(),
            best_score = results.first().map(|r| r.score),
            "Retrieved context chunks"
        );
        Ok(results)
    }
}
