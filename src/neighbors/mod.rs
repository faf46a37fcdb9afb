//! Multi-metric k-nearest-neighbor computation.
//!
//! # Architecture
//! [`NeighborIndex`] answers exact top-k queries for a single metric over the
//! whole embedding matrix. [`MultiMetricComputer`] runs one index per configured
//! metric and regroups the lists into one [`NeighborhoodMap`] per object.
//!
//! Output lists never contain the query object, always hold exactly `max_k`
//! entries, and are sorted by distance with ascending index breaking ties.

mod index;
mod metric;
mod multi;

pub use index::{NeighborIndex, NeighborList, validate_max_k};
pub use metric::{DistanceMetric, cosine_distance_with_norms, l2_norm};
pub use multi::{MultiMetricComputer, NeighborhoodMap};
