//! Contact snapshot carried with registrations and retries.

use serde::{Deserialize, Serialize};

use super::id::ContactId;

/// The four contact handles a registrar requires for a registration.
///
/// A snapshot of these IDs is persisted on every failed registration so a
/// retry does not depend on the contacts still existing or being unedited
/// at retry time. Retries always use the snapshot, never a live lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    /// Registrant (legal owner) contact.
    pub registrant: ContactId,
    /// Administrative contact.
    pub admin: ContactId,
    /// Technical contact.
    pub tech: ContactId,
    /// Billing contact.
    pub billing: ContactId,
}

impl ContactSnapshot {
    /// Snapshot where one contact fills all four roles.
    #[must_use]
    pub const fn single(contact: ContactId) -> Self {
        Self {
            registrant: contact,
            admin: contact,
            tech: contact,
            billing: contact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_contact_fills_all_roles() {
        let snapshot = ContactSnapshot::single(ContactId::new(3));
        assert_eq!(snapshot.registrant, snapshot.billing);
        assert_eq!(snapshot.admin, snapshot.tech);
    }

    #[test]
    fn test_snapshot_round_trips_as_json() {
        let snapshot = ContactSnapshot {
            registrant: ContactId::new(1),
            admin: ContactId::new(2),
            tech: ContactId::new(3),
            billing: ContactId::new(4),
        };
        let json = serde_json::to_value(&snapshot).expect("serialize");
        let back: ContactSnapshot = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, snapshot);
    }
}
