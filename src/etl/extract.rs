//! Extractor trait for per-source metric collection

use crate::model::SourceEntity;
use eyre::Result;

/// Extractor trait for collecting one record from one source entity
///
/// The scheduler calls `extract` once per entity, under a timeout, with at most
/// the configured number of calls in flight.
///
/// # Example
/// ```no_run
/// use lane_etl::etl::Extractor;
/// use lane_etl::model::SourceEntity;
/// use eyre::Result;
///
/// struct NameExtractor;
///
/// impl Extractor for NameExtractor {
///     type Item = String;
///
///     async fn extract(&self, entity: &SourceEntity) -> Result<Self::Item> {
///         Ok(entity.name.clone())
///     }
/// }
/// ```
pub trait Extractor: Send + Sync {
    /// The type of item extracted from one source
    type Item: Send;

    /// Extract a single item from the source entity
    ///
    /// # Errors
    /// Returns an error if the source cannot be reached or answers garbage
    fn extract(
        &self,
        entity: &SourceEntity,
    ) -> impl std::future::Future<Output = Result<Self::Item>> + Send;
}
