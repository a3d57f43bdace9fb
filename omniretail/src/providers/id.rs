//! Provider identifiers and the bitset used by the planner's rule tables.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// One of the four data domains a query can be answered from.
///
/// Declaration order is the canonical order used for stages, results and
/// narrative clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderId {
    /// Orders, products and users. Canonical resolver of `order_id`.
    ShopCore,
    /// Shipments and tracking events.
    ShipStream,
    /// Wallets, transactions and refunds.
    PayGuard,
    /// Support tickets and complaints.
    CareDesk,
}

impl ProviderId {
    /// All providers in canonical order.
    pub const ALL: [Self; 4] = [Self::ShopCore, Self::ShipStream, Self::PayGuard, Self::CareDesk];

    /// Returns the provider's name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShopCore => "ShopCore",
            Self::ShipStream => "ShipStream",
            Self::PayGuard => "PayGuard",
            Self::CareDesk => "CareDesk",
        }
    }

    /// Returns a short description of the provider's domain.
    #[must_use]
    pub const fn domain(self) -> &'static str {
        match self {
            Self::ShopCore => "orders and products",
            Self::ShipStream => "shipments and tracking",
            Self::PayGuard => "payments and refunds",
            Self::CareDesk => "support tickets",
        }
    }

    /// Whether this provider resolves the shared order identifier.
    #[must_use]
    pub const fn is_identifier_resolver(self) -> bool {
        matches!(self, Self::ShopCore)
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown provider: {s}"))
    }
}

/// A set of providers, stored as a bitset.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProviderSet(u8);

impl ProviderSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Every provider.
    pub const ALL: Self = Self::EMPTY
        .with(ProviderId::ShopCore)
        .with(ProviderId::ShipStream)
        .with(ProviderId::PayGuard)
        .with(ProviderId::CareDesk);

    /// Creates a set holding a single provider.
    #[must_use]
    pub const fn of(id: ProviderId) -> Self {
        Self(id.bit())
    }

    /// Returns this set with `id` added.
    #[must_use]
    pub const fn with(self, id: ProviderId) -> Self {
        Self(self.0 | id.bit())
    }

    /// Returns this set with `id` removed.
    #[must_use]
    pub const fn without(self, id: ProviderId) -> Self {
        Self(self.0 & !id.bit())
    }

    /// Returns the union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Adds a provider.
    pub fn insert(&mut self, id: ProviderId) {
        self.0 |= id.bit();
    }

    /// Checks membership.
    #[must_use]
    pub const fn contains(self, id: ProviderId) -> bool {
        self.0 & id.bit() != 0
    }

    /// Returns true if no provider is in the set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the number of providers in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns true if the sets share no provider.
    #[must_use]
    pub const fn is_disjoint(self, other: Self) -> bool {
        self.0 & other.0 == 0
    }

    /// Iterates members in canonical order.
    pub fn iter(self) -> impl Iterator<Item = ProviderId> {
        ProviderId::ALL.into_iter().filter(move |id| self.contains(*id))
    }

    /// Collects members in canonical order.
    #[must_use]
    pub fn to_vec(self) -> Vec<ProviderId> {
        self.iter().collect()
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl BitOr for ProviderSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for ProviderSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<ProviderId> for ProviderSet {
    fn from_iter<I: IntoIterator<Item = ProviderId>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl Serialize for ProviderSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names_round_trip() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
        assert_eq!("shipstream".parse::<ProviderId>().unwrap(), ProviderId::ShipStream);
        assert!("Warehouse".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_provider_serializes_as_name() {
        let json = serde_json::to_string(&ProviderId::PayGuard).unwrap();
        assert_eq!(json, "\"PayGuard\"");
    }

    #[test]
    fn test_set_operations() {
        let set = ProviderSet::of(ProviderId::CareDesk).with(ProviderId::ShopCore);
        assert_eq!(set.len(), 2);
        assert!(set.contains(ProviderId::ShopCore));
        assert!(!set.contains(ProviderId::PayGuard));
        assert_eq!(set.to_vec(), vec![ProviderId::ShopCore, ProviderId::CareDesk]);

        let without = set.without(ProviderId::ShopCore);
        assert_eq!(without.to_vec(), vec![ProviderId::CareDesk]);
        assert!(without.is_disjoint(ProviderSet::of(ProviderId::ShopCore)));
    }

    #[test]
    fn test_all_holds_every_provider() {
        assert_eq!(ProviderSet::ALL.len(), 4);
        assert_eq!(ProviderSet::ALL.to_vec(), ProviderId::ALL.to_vec());
        assert_eq!(ProviderId::ALL.into_iter().collect::<ProviderSet>(), ProviderSet::ALL);
    }

    #[test]
    fn test_set_serializes_in_canonical_order() {
        let set = ProviderSet::of(ProviderId::CareDesk) | ProviderSet::of(ProviderId::ShipStream);
        let json = serde_json::to_value(set).unwrap();
        assert_eq!(json, serde_json::json!(["ShipStream", "CareDesk"]));
    }
}
