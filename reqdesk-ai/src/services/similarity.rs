//! Similarity resolver

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use reqdesk_common::db::Request;

use crate::oracle::{prompts, Oracle, OracleError};

/// Asks the oracle which candidates resemble a reference request
///
/// No threshold is applied and similarity is not assumed symmetric.
pub struct SimilarityResolver {
    oracle: Arc<dyn Oracle>,
}

impl SimilarityResolver {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Ids of the candidates the oracle judges similar to `reference`
    ///
    /// Returns an empty set without calling the oracle when there are no
    /// candidates. The result is always a subset of the candidate ids.
    pub async fn find_similar(
        &self,
        reference: &Request,
        candidates: &[Request],
    ) -> Result<HashSet<Uuid>, OracleError> {
        if candidates.is_empty() {
            return Ok(HashSet::new());
        }

        let reply = self
            .oracle
            .complete(&prompts::similarity(reference, candidates))
            .await?;

        let candidate_ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
        let similar = prompts::parse_similar_ids(&reply, &candidate_ids);

        tracing::debug!(
            reference_id = %reference.id,
            candidates = candidates.len(),
            similar = similar.len(),
            "Similarity resolved"
        );

        Ok(similar)
    }
}
