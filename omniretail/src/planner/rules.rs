//! Data-driven intent rules.
//!
//! Each rule maps a vocabulary to a provider set. Domain rules use substring
//! matching on the lowercased query; continuation rules use whole-word
//! matching and only apply while an order identifier is active.

use crate::providers::{ProviderId, ProviderSet};

const SHOP: ProviderSet = ProviderSet::of(ProviderId::ShopCore);
const SHIP: ProviderSet = ProviderSet::of(ProviderId::ShipStream);
const PAY: ProviderSet = ProviderSet::of(ProviderId::PayGuard);
const CARE: ProviderSet = ProviderSet::of(ProviderId::CareDesk);

/// How a rule's keywords are matched against the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Keyword appears anywhere in the lowercased query.
    Substring,
    /// Keyword equals one of the query's words.
    Word,
}

/// Extra providers a rule pulls in when a second vocabulary also matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Companion {
    /// Words that trigger the companion selection.
    pub triggers: &'static [&'static str],
    /// Providers added when a trigger matches.
    pub selects: ProviderSet,
}

/// A vocabulary-to-providers rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordRule {
    /// Short name used in logs.
    pub name: &'static str,
    /// Vocabulary that activates the rule.
    pub keywords: &'static [&'static str],
    /// Matching semantics.
    pub mode: MatchMode,
    /// Providers selected when the rule fires.
    pub selects: ProviderSet,
    /// Optional conditional selection.
    pub companion: Option<Companion>,
}

impl KeywordRule {
    /// Evaluates the rule, returning the providers it selects.
    #[must_use]
    pub fn evaluate(&self, text: &QueryText) -> ProviderSet {
        if !self.keywords.iter().any(|k| text.matches(k, self.mode)) {
            return ProviderSet::EMPTY;
        }
        let mut selected = self.selects;
        if let Some(companion) = self.companion {
            if companion.triggers.iter().any(|k| text.matches(k, self.mode)) {
                selected |= companion.selects;
            }
        }
        selected
    }
}

/// Intent rules for the four domains.
pub const DOMAIN_RULES: &[KeywordRule] = &[
    KeywordRule {
        name: "order",
        keywords: &["order", "ordered", "product", "purchase", "bought", "buy"],
        mode: MatchMode::Substring,
        selects: SHOP,
        companion: None,
    },
    // Shipment lookups need the order id, so ShopCore rides along.
    KeywordRule {
        name: "shipment",
        keywords: &["track", "delivery", "shipment", "where", "location", "arrive", "delivered"],
        mode: MatchMode::Substring,
        selects: SHIP.union(SHOP),
        companion: None,
    },
    KeywordRule {
        name: "payment",
        keywords: &["refund", "payment", "transaction", "paid", "wallet", "balance"],
        mode: MatchMode::Substring,
        selects: PAY,
        companion: Some(Companion {
            triggers: &["order", "refund"],
            selects: SHOP,
        }),
    },
    KeywordRule {
        name: "support",
        keywords: &["ticket", "support", "complaint", "issue", "help", "problem"],
        mode: MatchMode::Substring,
        selects: CARE,
        companion: Some(Companion {
            triggers: &["order"],
            selects: SHOP,
        }),
    },
];

/// Follow-up vocabulary that applies while an order identifier is active.
pub const CONTINUATION_RULES: &[KeywordRule] = &[
    KeywordRule {
        name: "order-followup",
        keywords: &["details", "status"],
        mode: MatchMode::Word,
        selects: SHOP,
        companion: None,
    },
    KeywordRule {
        name: "shipment-followup",
        keywords: &["status", "tracking", "shipping", "delivery"],
        mode: MatchMode::Word,
        selects: SHIP,
        companion: None,
    },
    KeywordRule {
        name: "payment-followup",
        keywords: &["payment", "refund", "paid"],
        mode: MatchMode::Word,
        selects: PAY,
        companion: None,
    },
    KeywordRule {
        name: "support-followup",
        keywords: &["ticket", "support"],
        mode: MatchMode::Word,
        selects: CARE,
        companion: None,
    },
    KeywordRule {
        name: "universal-completion",
        keywords: &["complete", "all", "everything"],
        mode: MatchMode::Word,
        selects: ProviderSet::ALL,
        companion: None,
    },
];

/// Utterances that clear the user's session.
pub const RESET_PHRASES: &[&str] = &[
    "reset",
    "start over",
    "new conversation",
    "clear context",
    "clear session",
    "forget everything",
    "forget that",
];

/// Acknowledgement returned for reset utterances.
pub const RESET_ACKNOWLEDGEMENT: &str =
    "Okay, I've cleared our conversation. What can I help you with?";

/// A query prepared for rule matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryText {
    lowered: String,
    normalized: String,
}

impl QueryText {
    /// Prepares a raw query.
    #[must_use]
    pub fn new(query: &str) -> Self {
        let lowered = query.to_lowercase();
        let stripped: String = lowered
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect();
        let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        Self { lowered, normalized }
    }

    /// The lowercased query.
    #[must_use]
    pub fn lowered(&self) -> &str {
        &self.lowered
    }

    /// The lowercased query with punctuation removed and whitespace collapsed.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Iterates the query's words.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.normalized.split(' ').filter(|w| !w.is_empty())
    }

    /// Tests a keyword under the given mode.
    #[must_use]
    pub fn matches(&self, keyword: &str, mode: MatchMode) -> bool {
        match mode {
            MatchMode::Substring => self.lowered.contains(keyword),
            MatchMode::Word => self.words().any(|w| w == keyword),
        }
    }

    /// Whether the whole utterance is one of `phrases`.
    #[must_use]
    pub fn is_one_of(&self, phrases: &[impl AsRef<str>]) -> bool {
        phrases.iter().any(|p| p.as_ref() == self.normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let text = QueryText::new("  Start   OVER!! ");
        assert_eq!(text.normalized(), "start over");
        assert!(text.is_one_of(RESET_PHRASES));
    }

    #[test]
    fn test_reset_requires_whole_utterance() {
        let text = QueryText::new("please reset my password");
        assert!(!text.is_one_of(RESET_PHRASES));
    }

    #[test]
    fn test_substring_vs_word() {
        let text = QueryText::new("Where are my orders?");
        assert!(text.matches("order", MatchMode::Substring));
        assert!(!text.matches("order", MatchMode::Word));
        assert!(text.matches("orders", MatchMode::Word));
    }

    #[test]
    fn test_payment_companion() {
        let payment = &DOMAIN_RULES[2];
        assert_eq!(payment.evaluate(&QueryText::new("show my wallet balance")), PAY);
        assert_eq!(
            payment.evaluate(&QueryText::new("refund for my order")),
            PAY.union(SHOP)
        );
    }

    #[test]
    fn test_shipment_pulls_in_shop() {
        let shipment = &DOMAIN_RULES[1];
        assert_eq!(shipment.evaluate(&QueryText::new("track it")), SHIP.union(SHOP));
        assert!(shipment.evaluate(&QueryText::new("hello")).is_empty());
    }

    #[test]
    fn test_universal_completion_selects_all() {
        let rule = CONTINUATION_RULES
            .iter()
            .find(|r| r.name == "universal-completion")
            .unwrap();
        assert_eq!(rule.evaluate(&QueryText::new("Tell me everything.")), ProviderSet::ALL);
        assert!(rule.evaluate(&QueryText::new("overall")).is_empty());
    }
}
