//! Loader trait for submitting batches to a destination

use eyre::Result;

/// Loader trait for loading one batch to a destination
///
/// A batch is either accepted as a whole or rejected as a whole. Lane workers
/// persist rejected batches for replay on the next run.
///
/// # Example
/// ```no_run
/// use lane_etl::etl::Loader;
/// use eyre::Result;
///
/// struct StdoutLoader;
///
/// impl Loader for StdoutLoader {
///     type Item = String;
///
///     async fn load(&self, items: &[Self::Item]) -> Result<usize> {
///         for item in items {
///             println!("{item}");
///         }
///         Ok(items.len())
///     }
/// }
/// ```
pub trait Loader: Send + Sync {
    /// The type of items to load
    type Item: Send + Sync;

    /// Load a batch to the destination
    ///
    /// Returns the number of items loaded
    ///
    /// # Errors
    /// Returns an error if the destination rejects the batch or cannot be reached
    fn load(
        &self,
        items: &[Self::Item],
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}
