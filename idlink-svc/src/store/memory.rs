//! In-process contact store
//!
//! Backs `--in-memory` runs and the reconciler tests. Rows live in a
//! mutex-guarded vector; ids are assigned sequentially from 1.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idlink_common::db::models::sort_by_age;
use idlink_common::{Contact, Error, LinkPrecedence, NewContact, Result};
use std::sync::{Mutex, MutexGuard};

use super::ContactStore;

#[derive(Default)]
struct Inner {
    rows: Vec<Contact>,
    next_id: i64,
}

/// Contact store held entirely in memory
#[derive(Default)]
pub struct MemoryContactStore {
    inner: Mutex<Inner>,
    fixed_clock: Option<DateTime<Utc>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp every created row with `ts`, so ordering falls back to ids
    pub fn with_fixed_clock(ts: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            fixed_clock: Some(ts),
        }
    }

    /// Copy of every stored row, in id order
    pub fn snapshot(&self) -> Result<Vec<Contact>> {
        Ok(self.lock()?.rows.clone())
    }

    /// Number of stored rows
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_clock.unwrap_or_else(Utc::now)
    }

    fn collect_sorted<F>(&self, mut keep: F) -> Result<Vec<Contact>>
    where
        F: FnMut(&Contact) -> bool,
    {
        let inner = self.lock()?;
        let mut found: Vec<Contact> = inner
            .rows
            .iter()
            .filter(|c| c.deleted_at.is_none() && keep(c))
            .cloned()
            .collect();
        sort_by_age(&mut found);
        Ok(found)
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn find_by_value(&self, email: Option<&str>, phone: Option<&str>) -> Result<Vec<Contact>> {
        if email.is_none() && phone.is_none() {
            return Ok(Vec::new());
        }
        self.collect_sorted(|c| {
            let email_hit = email.is_some() && c.email.as_deref() == email;
            let phone_hit = phone.is_some() && c.phone_number.as_deref() == phone;
            email_hit || phone_hit
        })
    }

    async fn find_cluster(&self, anchor_id: i64) -> Result<Vec<Contact>> {
        self.collect_sorted(|c| c.id == anchor_id || c.linked_id == Some(anchor_id))
    }

    async fn create(&self, contact: NewContact) -> Result<Contact> {
        if (contact.link_precedence == LinkPrecedence::Primary) != contact.linked_id.is_none() {
            return Err(Error::Store(
                "linked_id must be set exactly when precedence is secondary".to_string(),
            ));
        }

        let now = self.now();
        let mut inner = self.lock()?;
        if let Some(target) = contact.linked_id {
            if !inner.rows.iter().any(|c| c.id == target) {
                return Err(Error::Store(format!("linked_id {} references no contact", target)));
            }
        }

        inner.next_id += 1;
        let row = Contact {
            id: inner.next_id,
            phone_number: contact.phone_number,
            email: contact.email,
            linked_id: contact.linked_id,
            link_precedence: contact.link_precedence,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.rows.push(row.clone());
        Ok(row)
    }

    async fn demote(&self, contact_id: i64, new_primary_id: i64) -> Result<Contact> {
        let now = self.now();
        let mut inner = self.lock()?;
        let row = inner
            .rows
            .iter_mut()
            .find(|c| c.id == contact_id && c.deleted_at.is_none())
            .ok_or_else(|| Error::NotFound(format!("contact {}", contact_id)))?;

        row.link_precedence = LinkPrecedence::Secondary;
        row.linked_id = Some(new_primary_id);
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn relink_children(&self, old_primary_id: i64, new_primary_id: i64) -> Result<u64> {
        let now = self.now();
        let mut inner = self.lock()?;
        let mut changed = 0;
        for row in inner.rows.iter_mut().filter(|c| {
            c.deleted_at.is_none()
                && c.link_precedence == LinkPrecedence::Secondary
                && c.linked_id == Some(old_primary_id)
        }) {
            row.linked_id = Some(new_primary_id);
            row.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }
}
