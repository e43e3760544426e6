//! Identity reconciliation
//!
//! [`Reconciler::identify`] finds every contact sharing the request's email
//! or phone, creates or merges contacts as needed and returns the
//! consolidated view of the resulting cluster.

mod consolidate;
mod identify;
mod locks;

pub use consolidate::{build_view, consolidate, ConsolidatedView};
pub use identify::{IdentifyRequest, Reconciler};
