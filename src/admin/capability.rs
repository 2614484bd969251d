use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AppError;

/// A single admin permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewUsers,
    ManageUsers,
    ViewLedger,
    AdjustCoins,
    ManageRules,
    ViewReferrals,
    ManageReferrals,
    ManageAdmins,
    ViewSecurity,
    SendNotifications,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::ViewUsers,
        Capability::ManageUsers,
        Capability::ViewLedger,
        Capability::AdjustCoins,
        Capability::ManageRules,
        Capability::ViewReferrals,
        Capability::ManageReferrals,
        Capability::ManageAdmins,
        Capability::ViewSecurity,
        Capability::SendNotifications,
    ];

    // Bit positions are persisted; append new capabilities at the end.
    const fn bit(self) -> i32 {
        1 << (self as i32)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ViewUsers => "view_users",
            Capability::ManageUsers => "manage_users",
            Capability::ViewLedger => "view_ledger",
            Capability::AdjustCoins => "adjust_coins",
            Capability::ManageRules => "manage_rules",
            Capability::ViewReferrals => "view_referrals",
            Capability::ManageReferrals => "manage_referrals",
            Capability::ManageAdmins => "manage_admins",
            Capability::ViewSecurity => "view_security",
            Capability::SendNotifications => "send_notifications",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of capabilities held by a role, persisted as an integer bit set and
/// exchanged over the API as a list of capability names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct CapabilitySet(i32);

impl CapabilitySet {
    pub const fn empty() -> Self {
        CapabilitySet(0)
    }

    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn insert(&mut self, cap: Capability) {
        self.0 |= cap.bit();
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = CapabilitySet::empty();
        for cap in iter {
            set.insert(cap);
        }
        set
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let caps = Vec::<Capability>::deserialize(deserializer)
            .map_err(|e| de::Error::custom(format!("invalid capability list: {e}")))?;
        Ok(caps.into_iter().collect())
    }
}

/// Explicit authorization check against a session's capability set.
pub trait Authorize {
    fn capabilities(&self) -> CapabilitySet;

    fn can(&self, cap: Capability) -> bool {
        self.capabilities().contains(cap)
    }

    fn require(&self, cap: Capability) -> Result<(), AppError> {
        if self.can(cap) {
            Ok(())
        } else {
            Err(AppError::Forbidden(cap))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(CapabilitySet);

    impl Authorize for Fixed {
        fn capabilities(&self) -> CapabilitySet {
            self.0
        }
    }

    #[test]
    fn set_membership() {
        let mut set: CapabilitySet = [Capability::ViewUsers, Capability::AdjustCoins]
            .into_iter()
            .collect();
        assert!(set.contains(Capability::ViewUsers));
        assert!(set.contains(Capability::AdjustCoins));
        assert!(!set.contains(Capability::ManageAdmins));
        assert_eq!(set.iter().count(), 2);

        set.insert(Capability::SendNotifications);
        assert!(set.contains(Capability::SendNotifications));
        assert!(!set.contains(Capability::ViewSecurity));
        assert_eq!(CapabilitySet::all().iter().count(), Capability::ALL.len());
        assert_eq!(CapabilitySet::empty().iter().count(), 0);
    }

    #[test]
    fn serializes_as_names() {
        let set: CapabilitySet = [Capability::ManageRules, Capability::ViewLedger]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["view_ledger","manage_rules"]"#);

        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn unknown_capability_is_rejected() {
        let err = serde_json::from_str::<CapabilitySet>(r#"["view_users","fly"]"#).unwrap_err();
        assert!(err.to_string().contains("invalid capability list"));
    }

    #[test]
    fn require_fails_with_forbidden() {
        let session = Fixed([Capability::ViewUsers].into_iter().collect());
        assert!(session.require(Capability::ViewUsers).is_ok());
        let err = session.require(Capability::ManageUsers).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(Capability::ManageUsers)));
    }
}
