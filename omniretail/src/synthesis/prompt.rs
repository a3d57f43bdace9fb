//! Prompt construction for the generation capability.

use super::SynthesisRequest;
use std::fmt::Write;

/// Records shown per provider before the transcript elides the rest.
const MAX_RECORDS_PER_PROVIDER: usize = 20;

const GUARDRAILS: &str = "\
RULES:
1. Answer only from the provider data above. Never invent orders, dates, amounts or statuses.
2. Merge everything into one short, friendly narrative addressed to the customer.
3. If a provider found nothing, say so plainly. If a provider failed, say that part of the information is temporarily unavailable.
4. Do not mention provider names, database fields, table names or raw identifiers unless the customer needs them (tracking numbers and order numbers are fine).
5. If you relied on carried-over facts from earlier in the conversation, make that clear (for example \"your order from before\").
";

/// Builds the full prompt: query, carried-over facts, per-provider
/// transcript and guardrails.
#[must_use]
pub fn build_prompt(request: &SynthesisRequest<'_>) -> String {
    let mut prompt = String::from(
        "You are a customer support assistant for an online retailer. \
         Write the reply to the customer's question using the data gathered below.\n\n",
    );

    let _ = writeln!(prompt, "CUSTOMER QUESTION: {}\n", request.query);

    if !request.carried_context.is_empty() {
        prompt.push_str("CARRIED-OVER FACTS (from earlier in this conversation):\n");
        for (key, value) in request.carried_context.iter() {
            let _ = writeln!(prompt, "  {key}: {value}");
        }
        prompt.push('\n');
    }

    prompt.push_str("PROVIDER DATA:\n");
    prompt.push_str(&transcript(request));
    prompt.push('\n');
    prompt.push_str(GUARDRAILS);
    prompt.push_str("\nReply:");
    prompt
}

/// Per-provider summary in canonical order.
#[must_use]
pub fn transcript(request: &SynthesisRequest<'_>) -> String {
    let mut out = String::new();

    for (id, result) in request.results {
        let _ = writeln!(out, "{id} ({}):", id.domain());
        if result.success {
            let _ = writeln!(out, "  status: success");
            let _ = writeln!(out, "  records: {}", result.record_count);
            for record in result.data.iter().take(MAX_RECORDS_PER_PROVIDER) {
                let _ = writeln!(out, "  - {record}");
            }
            if result.data.len() > MAX_RECORDS_PER_PROVIDER {
                let _ = writeln!(
                    out,
                    "  ({} more records omitted)",
                    result.data.len() - MAX_RECORDS_PER_PROVIDER
                );
            }
        } else {
            let _ = writeln!(out, "  status: failed");
            let _ = writeln!(
                out,
                "  error: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        if let Some(message) = &result.message {
            let _ = writeln!(out, "  note: {message}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::providers::{ProviderId, ProviderResult};
    use crate::testing::order_record;
    use std::collections::BTreeMap;

    #[test]
    fn test_prompt_sections() {
        let mut results = BTreeMap::new();
        results.insert(
            ProviderId::ShopCore,
            ProviderResult::success(vec![order_record(7, "Widget")]),
        );
        results.insert(
            ProviderId::ShipStream,
            ProviderResult::empty().with_message("No shipment found for this order"),
        );
        results.insert(ProviderId::PayGuard, ProviderResult::failure("timeout"));
        let carried = Context::new().with("order_id", 7);

        let request = SynthesisRequest::new("Where is my order?", &results, &carried);
        let prompt = build_prompt(&request);

        assert!(prompt.contains("CUSTOMER QUESTION: Where is my order?"));
        assert!(prompt.contains("CARRIED-OVER FACTS"));
        assert!(prompt.contains("  order_id: 7"));
        assert!(prompt.contains("ShopCore (orders and products):\n  status: success\n  records: 1"));
        assert!(prompt.contains("\"product_name\":\"Widget\""));
        assert!(prompt.contains("  note: No shipment found for this order"));
        assert!(prompt.contains("PayGuard (payments and refunds):\n  status: failed\n  error: timeout"));
        assert!(prompt.contains("Never invent"));
    }

    #[test]
    fn test_no_carried_section_for_fresh_session() {
        let mut results = BTreeMap::new();
        results.insert(ProviderId::CareDesk, ProviderResult::empty());
        let carried = Context::new();

        let prompt = build_prompt(&SynthesisRequest::new("help", &results, &carried));
        assert!(!prompt.contains("CARRIED-OVER FACTS"));
    }

    #[test]
    fn test_long_data_is_elided() {
        let records = (0..25).map(|i| order_record(i, "Item")).collect();
        let mut results = BTreeMap::new();
        results.insert(ProviderId::ShopCore, ProviderResult::success(records));
        let carried = Context::new();

        let text = transcript(&SynthesisRequest::new("orders", &results, &carried));
        assert!(text.contains("(5 more records omitted)"));
        assert!(text.contains("records: 25"));
    }
}
