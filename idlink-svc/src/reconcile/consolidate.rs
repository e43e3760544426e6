//! Consolidated view of a cluster

use idlink_common::db::models::sort_by_age;
use idlink_common::{Contact, Error, Result};
use serde::Serialize;

use crate::store::ContactStore;

/// Everything known about one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedView {
    pub primary_contact_id: i64,
    /// Distinct emails, the primary's first
    pub emails: Vec<String>,
    /// Distinct phone numbers, the primary's first
    pub phone_numbers: Vec<String>,
    /// Secondary ids, oldest first
    pub secondary_contact_ids: Vec<i64>,
}

/// Fetch the cluster rooted at `primary_id` and build its view
pub async fn consolidate(store: &dyn ContactStore, primary_id: i64) -> Result<ConsolidatedView> {
    let cluster = store.find_cluster(primary_id).await?;
    build_view(cluster, primary_id)
}

/// Build the view from the rows of one cluster
pub fn build_view(mut cluster: Vec<Contact>, primary_id: i64) -> Result<ConsolidatedView> {
    sort_by_age(&mut cluster);

    let primary = cluster
        .iter()
        .find(|c| c.id == primary_id)
        .ok_or_else(|| Error::NotFound(format!("contact {}", primary_id)))?;
    if !primary.is_primary() {
        return Err(Error::Invariant(format!(
            "cluster root {} is not a primary contact",
            primary_id
        )));
    }

    let secondaries: Vec<&Contact> = cluster
        .iter()
        .filter(|c| c.id != primary_id && !c.is_primary())
        .collect();

    let emails = collect_distinct(
        primary.email.as_deref(),
        secondaries.iter().map(|c| c.email.as_deref()),
    );
    let phone_numbers = collect_distinct(
        primary.phone_number.as_deref(),
        secondaries.iter().map(|c| c.phone_number.as_deref()),
    );

    Ok(ConsolidatedView {
        primary_contact_id: primary_id,
        emails,
        phone_numbers,
        secondary_contact_ids: secondaries.iter().map(|c| c.id).collect(),
    })
}

/// First-seen distinct values with `lead` (when present) at index 0
fn collect_distinct<'a>(
    lead: Option<&'a str>,
    rest: impl Iterator<Item = Option<&'a str>>,
) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for value in lead.into_iter().chain(rest.flatten()) {
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }

    if let Some(lead) = lead {
        if let Some(pos) = values.iter().position(|v| v == lead) {
            values.swap(0, pos);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use idlink_common::LinkPrecedence;

    fn row(id: i64, email: Option<&str>, phone: Option<&str>, linked: Option<i64>, secs: i64) -> Contact {
        let ts = Utc.timestamp_opt(secs, 0).unwrap();
        Contact {
            id,
            phone_number: phone.map(String::from),
            email: email.map(String::from),
            linked_id: linked,
            link_precedence: if linked.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            created_at: ts,
            updated_at: ts,
            deleted_at: None,
        }
    }

    #[test]
    fn test_primary_values_lead_and_duplicates_drop() {
        let cluster = vec![
            row(5, Some("b@x"), Some("2"), Some(1), 20),
            row(1, Some("a@x"), Some("1"), None, 10),
            row(7, Some("a@x"), Some("2"), Some(1), 30),
            row(9, None, Some("3"), Some(1), 40),
        ];

        let view = build_view(cluster, 1).unwrap();
        assert_eq!(view.primary_contact_id, 1);
        assert_eq!(view.emails, vec!["a@x", "b@x"]);
        assert_eq!(view.phone_numbers, vec!["1", "2", "3"]);
        assert_eq!(view.secondary_contact_ids, vec![5, 7, 9]);
    }

    #[test]
    fn test_primary_without_email() {
        let cluster = vec![
            row(1, None, Some("1"), None, 10),
            row(2, Some("a@x"), Some("1"), Some(1), 20),
        ];

        let view = build_view(cluster, 1).unwrap();
        assert_eq!(view.emails, vec!["a@x"]);
        assert_eq!(view.phone_numbers, vec!["1"]);
    }

    #[test]
    fn test_lead_value_is_swapped_to_front() {
        let values = collect_distinct(Some("a"), vec![Some("b"), None, Some("a")].into_iter());
        assert_eq!(values, vec!["a", "b"]);

        let values = collect_distinct(None, vec![Some("b"), Some("c"), Some("b")].into_iter());
        assert_eq!(values, vec!["b", "c"]);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let cluster = vec![row(2, Some("a@x"), None, Some(1), 20)];
        assert!(matches!(build_view(cluster, 1), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_secondary_root_is_invariant_error() {
        let cluster = vec![row(2, Some("a@x"), None, Some(1), 20)];
        assert!(matches!(build_view(cluster, 2), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let view = build_view(vec![row(1, Some("a@x"), None, None, 0)], 1).unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["primaryContactId"], 1);
        assert_eq!(json["phoneNumbers"], serde_json::json!([]));
        assert_eq!(json["secondaryContactIds"], serde_json::json!([]));
    }
}
