//! Static assignment of source entities to lanes

/// Lane for the entity at `position` in the source list.
///
/// Depends only on list position, never on extraction completion order, so an
/// entity lands on the same lane every run as long as the list and lane count
/// are unchanged.
///
/// # Panics
/// Panics if `lanes` is zero; configuration validation rejects that earlier.
pub fn lane_for(position: usize, lanes: usize) -> usize {
    position % lanes
}
