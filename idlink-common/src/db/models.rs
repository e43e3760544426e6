//! Contact model
//!
//! A contact row carries an optional email and an optional phone number.
//! Rows sharing either value belong to one identity cluster, rooted at a
//! single primary contact; every other member is a secondary that points
//! back at the primary through `linked_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a contact within its cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    /// Parse the database representation (`primary` / `secondary`)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "primary" => Some(LinkPrecedence::Primary),
            "secondary" => Some(LinkPrecedence::Secondary),
            _ => None,
        }
    }

    /// Convert to database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            LinkPrecedence::Primary => "primary",
            LinkPrecedence::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for LinkPrecedence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A stored contact row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub linked_id: Option<i64>,
    pub link_precedence: LinkPrecedence,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    /// Ordering key: creation time, then id for equal timestamps
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }

    /// True when this row carries exactly the given email/phone pair
    pub fn has_pair(&self, email: &str, phone: &str) -> bool {
        self.email.as_deref() == Some(email) && self.phone_number.as_deref() == Some(phone)
    }
}

/// Sort contacts ascending by (`created_at`, `id`)
pub fn sort_by_age(contacts: &mut [Contact]) {
    contacts.sort_by_key(Contact::order_key);
}

/// Insert payload for a new contact row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<i64>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    /// A new cluster root
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    /// A new member of the cluster rooted at `primary_id`
    pub fn secondary(email: Option<String>, phone_number: Option<String>, primary_id: i64) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn contact(id: i64, secs: i64) -> Contact {
        let ts = Utc.timestamp_opt(secs, 0).unwrap();
        Contact {
            id,
            phone_number: None,
            email: None,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
            created_at: ts,
            updated_at: ts,
            deleted_at: None,
        }
    }

    #[test]
    fn test_precedence_db_strings() {
        assert_eq!(LinkPrecedence::from_str("primary"), Some(LinkPrecedence::Primary));
        assert_eq!(LinkPrecedence::from_str("SECONDARY"), Some(LinkPrecedence::Secondary));
        assert_eq!(LinkPrecedence::from_str("tertiary"), None);
        assert_eq!(LinkPrecedence::Secondary.to_db_string(), "secondary");
    }

    #[test]
    fn test_sort_by_age_breaks_ties_by_id() {
        let mut rows = vec![contact(7, 100), contact(3, 100), contact(9, 50)];
        sort_by_age(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![9, 3, 7]);
    }

    #[test]
    fn test_contact_serializes_camel_case() {
        let json = serde_json::to_value(contact(1, 0)).unwrap();
        assert_eq!(json["linkPrecedence"], "primary");
        assert!(json["linkedId"].is_null());
        assert!(json.get("phoneNumber").is_some());
    }
}
