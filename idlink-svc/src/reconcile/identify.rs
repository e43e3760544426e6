//! The identify operation
//!
//! Decision rules, given the contacts matching the request's email or phone:
//! - nothing matches: the request becomes a new primary;
//! - several primaries match: the oldest survives, every other one is
//!   demoted under it, and a secondary is added unless each supplied value
//!   already appears on one of those primaries;
//! - at most one primary matches: the request joins that cluster (or the
//!   cluster of a matched secondary) as a new secondary unless a member
//!   already carries the same values. With both values supplied, only a
//!   member carrying the exact pair counts.
//!
//! The merge branch tests coverage field by field while the direct branch
//! requires the exact pair; both rules are kept as they are.

use idlink_common::{Contact, Error, NewContact, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::consolidate::{build_view, consolidate, ConsolidatedView};
use super::locks::{identity_keys, KeyLocks};
use crate::store::ContactStore;

/// Longest `linked_id` chain followed when resolving a secondary's primary
const MAX_LINK_DEPTH: usize = 32;

/// What an identify request will do, decided under the request's locks
enum Plan {
    Create,
    /// Matched primaries, oldest first
    Merge(Vec<Contact>),
    /// Cluster root the request joins
    Attach(Contact),
}

/// Keys of every contact a plan reads or writes
fn plan_keys(matches: &[Contact], plan: &Plan) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = BTreeSet::new();
    for c in matches {
        keys.extend(identity_keys(c.email.as_deref(), c.phone_number.as_deref()));
    }
    if let Plan::Attach(anchor) = plan {
        keys.extend(identity_keys(anchor.email.as_deref(), anchor.phone_number.as_deref()));
    }
    keys
}

/// Incoming identify request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl IdentifyRequest {
    /// Build a request; empty strings count as absent
    pub fn new(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email: email.filter(|e| !e.is_empty()),
            phone_number: phone_number.filter(|p| !p.is_empty()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.email.is_none() && self.phone_number.is_none() {
            return Err(Error::InvalidInput(
                "either email or phoneNumber must be provided".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reconciles identify requests against a contact store
pub struct Reconciler {
    store: Arc<dyn ContactStore>,
    locks: KeyLocks,
    cascade_children: bool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
            cascade_children: false,
        }
    }

    /// Re-link the children of demoted primaries to the survivor
    pub fn with_cascade_children(mut self, cascade: bool) -> Self {
        self.cascade_children = cascade;
        self
    }

    pub fn store(&self) -> &Arc<dyn ContactStore> {
        &self.store
    }

    /// Resolve the request to a consolidated view, creating or merging
    /// contacts as needed
    ///
    /// Store failures are propagated without retry. Demotions in a merge
    /// are applied one at a time, so a failure part-way leaves some
    /// primaries undemoted; the next request touching them finishes the
    /// merge.
    pub async fn identify(&self, request: IdentifyRequest) -> Result<ConsolidatedView> {
        let request = IdentifyRequest::new(request.email, request.phone_number);
        request.validate()?;

        let email = request.email.as_deref();
        let phone = request.phone_number.as_deref();

        // Lock the request's keys, then widen to the keys of every contact
        // the plan touches until a read under the held locks needs no more.
        let mut held: BTreeSet<String> = identity_keys(email, phone).into_iter().collect();
        loop {
            let keys: Vec<String> = held.iter().cloned().collect();
            let guard = self.locks.acquire(&keys).await;

            let matches = self.store.find_by_value(email, phone).await?;
            let plan = self.plan(&matches).await?;

            let needed = plan_keys(&matches, &plan);
            if !needed.is_subset(&held) {
                drop(guard);
                let before = held.len();
                held.extend(needed);
                debug!("identify: widening lock set from {} to {} key(s)", before, held.len());
                continue;
            }

            debug!("identify: {} contact(s) match {:?}", matches.len(), keys);
            let view = match plan {
                Plan::Create => self.create_primary(&request).await,
                Plan::Merge(primaries) => self.merge(&request, &primaries).await,
                Plan::Attach(anchor) => self.attach(&request, &anchor).await,
            };
            drop(guard);
            return view;
        }
    }

    /// Decide what the matches call for
    async fn plan(&self, matches: &[Contact]) -> Result<Plan> {
        if matches.is_empty() {
            return Ok(Plan::Create);
        }

        let mut primaries: Vec<Contact> = matches.iter().filter(|c| c.is_primary()).cloned().collect();
        primaries.sort_by_key(Contact::order_key);

        match primaries.len() {
            0 => {
                // No primary matched, so every match is a secondary
                let anchor = self.resolve_primary(&matches[0]).await?;
                Ok(Plan::Attach(anchor))
            }
            1 => Ok(Plan::Attach(primaries.remove(0))),
            _ => Ok(Plan::Merge(primaries)),
        }
    }

    async fn create_primary(&self, request: &IdentifyRequest) -> Result<ConsolidatedView> {
        let created = self
            .store
            .create(NewContact::primary(request.email.clone(), request.phone_number.clone()))
            .await?;
        info!("Created primary contact {}", created.id);
        let id = created.id;
        build_view(vec![created], id)
    }

    /// Several primaries share the request's values: fold them into the oldest
    async fn merge(&self, request: &IdentifyRequest, primaries: &[Contact]) -> Result<ConsolidatedView> {
        let survivor = &primaries[0];

        for other in &primaries[1..] {
            self.store.demote(other.id, survivor.id).await?;
            info!("Merged primary contact {} into {}", other.id, survivor.id);

            if self.cascade_children {
                let moved = self.store.relink_children(other.id, survivor.id).await?;
                if moved > 0 {
                    debug!("Re-linked {} child contact(s) of {} to {}", moved, other.id, survivor.id);
                }
            }
        }

        let email_covered = request
            .email
            .as_deref()
            .map_or(true, |e| primaries.iter().any(|p| p.email.as_deref() == Some(e)));
        let phone_covered = request
            .phone_number
            .as_deref()
            .map_or(true, |ph| primaries.iter().any(|p| p.phone_number.as_deref() == Some(ph)));

        if !(email_covered && phone_covered) {
            self.add_secondary(request, survivor.id).await?;
        }

        consolidate(self.store.as_ref(), survivor.id).await
    }

    /// At most one primary matched: join the request to its cluster
    async fn attach(&self, request: &IdentifyRequest, anchor: &Contact) -> Result<ConsolidatedView> {
        let cluster = self.store.find_cluster(anchor.id).await?;

        let required = match (request.email.as_deref(), request.phone_number.as_deref()) {
            (Some(e), Some(ph)) => !cluster.iter().any(|c| c.has_pair(e, ph)),
            (Some(e), None) => !cluster.iter().any(|c| c.email.as_deref() == Some(e)),
            (None, Some(ph)) => !cluster.iter().any(|c| c.phone_number.as_deref() == Some(ph)),
            (None, None) => false,
        };

        if required {
            self.add_secondary(request, anchor.id).await?;
        }

        consolidate(self.store.as_ref(), anchor.id).await
    }

    /// Follow `linked_id` from a secondary until a primary is reached
    ///
    /// More than one hop only happens when a merge demoted a primary that
    /// already had children and they were not re-linked.
    async fn resolve_primary(&self, start: &Contact) -> Result<Contact> {
        let mut current = start.clone();

        for hop in 0..MAX_LINK_DEPTH {
            let target = current.linked_id.ok_or_else(|| {
                Error::Invariant(format!("secondary contact {} has no linked_id", current.id))
            })?;

            let cluster = self.store.find_cluster(target).await?;
            let parent = cluster
                .into_iter()
                .find(|c| c.id == target)
                .ok_or_else(|| Error::NotFound(format!("contact {}", target)))?;

            if parent.is_primary() {
                if hop > 0 {
                    warn!(
                        "Contact {} reaches primary {} through {} demoted link(s)",
                        start.id, parent.id, hop
                    );
                }
                return Ok(parent);
            }
            current = parent;
        }

        Err(Error::Invariant(format!(
            "no primary within {} links of contact {}",
            MAX_LINK_DEPTH, start.id
        )))
    }

    async fn add_secondary(&self, request: &IdentifyRequest, primary_id: i64) -> Result<Contact> {
        let created = self
            .store
            .create(NewContact::secondary(
                request.email.clone(),
                request.phone_number.clone(),
                primary_id,
            ))
            .await?;
        info!("Created secondary contact {} linked to {}", created.id, primary_id);
        Ok(created)
    }
}
