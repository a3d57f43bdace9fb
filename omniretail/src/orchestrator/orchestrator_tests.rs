use super::*;
use crate::events::{CollectingEventSink, STAGE_STARTED};
use crate::planner::RESET_ACKNOWLEDGEMENT;
use crate::synthesis::{MockGenerationClient, NO_SOURCES_NARRATIVE};
use crate::testing::{
    assert_narrative_contains, order_record, registry_of, resolved_order, shipment_record,
    FailingProvider, ScriptedProvider,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

use crate::providers::ProviderId::{CareDesk, PayGuard, ShipStream, ShopCore};

struct Fleet {
    shop: Arc<ScriptedProvider>,
    ship: Arc<ScriptedProvider>,
    pay: Arc<ScriptedProvider>,
    care: Arc<ScriptedProvider>,
}

impl Fleet {
    fn new() -> Self {
        Self {
            shop: Arc::new(ScriptedProvider::new(ShopCore, resolved_order(7, "Widget"))),
            ship: Arc::new(ScriptedProvider::new(
                ShipStream,
                ProviderResult::success(vec![shipment_record(7, "in_transit")]),
            )),
            pay: Arc::new(ScriptedProvider::new(PayGuard, ProviderResult::empty())),
            care: Arc::new(ScriptedProvider::new(CareDesk, ProviderResult::empty())),
        }
    }

    fn registry(&self) -> ProviderRegistry {
        registry_of(vec![
            self.shop.clone(),
            self.ship.clone(),
            self.pay.clone(),
            self.care.clone(),
        ])
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::builder(self.registry()).build()
    }
}

#[tokio::test]
async fn test_order_lookup_feeds_shipment_and_session() {
    let fleet = Fleet::new();
    let orchestrator = fleet.orchestrator();

    let response = orchestrator.process_query("Where is my order 7?", Some(1)).await;

    assert_eq!(response.original_query, "Where is my order 7?");
    assert_eq!(response.agents_invoked, vec![ShopCore, ShipStream]);
    assert_eq!(
        response.narrative_response,
        "ShopCore: Found 1 records. ShipStream: Found 1 records."
    );
    assert_eq!(fleet.ship.recorded_contexts()[0].order_id(), Some(7));

    let session = orchestrator.session(1).unwrap();
    assert_eq!(session.order_id(), Some(7));
    assert_eq!(session.get("product_name"), Some(&json!("Widget")));
}

#[tokio::test]
async fn test_carried_identifier_runs_everything_in_one_stage() {
    let fleet = Fleet::new();
    let orchestrator = fleet.orchestrator();
    orchestrator.process_query("Where is my order 7?", Some(1)).await;

    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = Orchestrator {
        events: sink.clone(),
        executor: StageExecutor::new(Arc::new(fleet.registry()), ExecutorConfig::default())
            .with_event_sink(sink.clone()),
        ..orchestrator
    };
    let response = orchestrator.process_query("Tell me everything", Some(1)).await;

    assert_eq!(
        response.agents_invoked,
        vec![ShopCore, ShipStream, PayGuard, CareDesk]
    );
    assert_eq!(sink.events_of_type(STAGE_STARTED).len(), 1);
    assert_eq!(fleet.care.recorded_contexts()[0].order_id(), Some(7));
}

#[tokio::test]
async fn test_explicit_identifier_overrides_session() {
    let fleet = Fleet::new();
    let orchestrator = fleet.orchestrator();
    orchestrator.process_query("Where is my order 7?", Some(1)).await;

    fleet.shop.set_result(ProviderResult::success(vec![order_record(42, "Lamp")]));
    orchestrator.process_query("What did I buy in order 42?", Some(1)).await;

    assert_eq!(fleet.shop.recorded_contexts()[1].order_id(), Some(42));
    assert_eq!(orchestrator.session(1).unwrap().order_id(), Some(42));
}

#[tokio::test]
async fn test_naming_a_new_order_replaces_the_old_order_facts() {
    let fleet = Fleet::new();
    fleet.shop.set_result(
        ProviderResult::success(vec![order_record(7, "Widget")]).with_context_delta(
            Context::new()
                .with("order_id", "7")
                .with("product_name", "Widget"),
        ),
    );
    let orchestrator = fleet.orchestrator();
    orchestrator.process_query("What did I order?", Some(1)).await;
    assert_eq!(orchestrator.session(1).unwrap().get("order_id"), Some(&json!(7)));

    fleet.shop.set_result(ProviderResult::success(vec![order_record(42, "Lamp")]));
    orchestrator.process_query("What did I buy in order 42?", Some(1)).await;
    assert_eq!(
        orchestrator.session(1).unwrap().to_json(),
        json!({"order_id": 42, "product_name": "Lamp"})
    );

    orchestrator.process_query("status details", Some(1)).await;
    assert_eq!(fleet.shop.recorded_contexts()[2].order_id(), Some(42));
}

#[tokio::test]
async fn test_switching_orders_does_not_leak_old_product() {
    let fleet = Fleet::new();
    let orchestrator = fleet.orchestrator();
    orchestrator.process_query("Where is my order 7?", Some(1)).await;

    fleet.shop.set_result(resolved_order(42, "Lamp"));
    let response = orchestrator.process_query("Where is my order 42?", Some(1)).await;

    assert_eq!(response.agents_invoked, vec![ShopCore, ShipStream]);
    assert_eq!(
        fleet.shop.recorded_contexts()[1].to_json(),
        json!({"order_id": 42, "user_id": 1})
    );
    let ship_seen = &fleet.ship.recorded_contexts()[1];
    assert_eq!(ship_seen.order_id(), Some(42));
    assert_eq!(ship_seen.get("product_name"), Some(&json!("Lamp")));
}

#[tokio::test]
async fn test_reset_clears_session_without_invoking_providers() {
    let fleet = Fleet::new();
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = Orchestrator::builder(fleet.registry())
        .event_sink(sink.clone())
        .build();
    orchestrator.process_query("Where is my order 7?", Some(1)).await;
    let calls_before = fleet.shop.call_count();

    let response = orchestrator.process_query("Start over", Some(1)).await;

    assert_eq!(response.narrative_response, RESET_ACKNOWLEDGEMENT);
    assert!(response.agents_invoked.is_empty());
    assert!(response.data_sources.is_empty());
    assert_eq!(fleet.shop.call_count(), calls_before);
    assert!(orchestrator.session(1).unwrap().is_empty());
    assert_eq!(sink.events_of_type(SESSION_RESET).len(), 1);
}

#[tokio::test]
async fn test_provider_failure_is_isolated_in_fallback() {
    let shop: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(
        ShopCore,
        ProviderResult::success(vec![order_record(3, "Kettle")]),
    ));
    let pay: Arc<dyn Provider> = Arc::new(FailingProvider::new(PayGuard, "ledger offline"));
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = Orchestrator::builder(registry_of(vec![shop, pay]))
        .event_sink(sink.clone())
        .build();

    let response = orchestrator.process_query("I want a refund for my order", None).await;

    assert_eq!(response.agents_invoked, vec![ShopCore, PayGuard]);
    assert_narrative_contains(&response.narrative_response, "ShopCore: Found 1 records.");
    assert_narrative_contains(&response.narrative_response, "PayGuard: Error occurred.");
    assert_eq!(
        response.data_sources[&PayGuard].error.as_deref(),
        Some("ledger offline")
    );
    assert_eq!(sink.events_of_type(SYNTHESIS_FALLBACK).len(), 1);
}

#[tokio::test]
async fn test_anonymous_queries_leave_no_session() {
    let fleet = Fleet::new();
    let orchestrator = fleet.orchestrator();

    orchestrator.process_query("Where is my order 7?", None).await;

    assert!(orchestrator.sessions().is_empty());
    assert_eq!(orchestrator.history_len(), 1);
}

#[tokio::test]
async fn test_unmatched_query_consults_nothing() {
    let fleet = Fleet::new();
    let orchestrator = fleet.orchestrator();

    let response = orchestrator.process_query("Good morning!", Some(4)).await;

    assert!(response.agents_invoked.is_empty());
    assert_eq!(response.narrative_response, NO_SOURCES_NARRATIVE);
    assert_eq!(fleet.shop.call_count(), 0);
}

#[tokio::test]
async fn test_history_is_filtered_by_user() {
    let fleet = Fleet::new();
    let orchestrator = fleet.orchestrator();

    orchestrator.process_query("Where is my order 7?", Some(1)).await;
    orchestrator.process_query("Open a support ticket", Some(2)).await;
    orchestrator.process_query("reset", Some(1)).await;

    assert_eq!(orchestrator.history(None).len(), 3);
    let mine = orchestrator.history(Some(1));
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].providers_invoked, vec![ShopCore, ShipStream]);
    assert_eq!(mine[1].narrative, RESET_ACKNOWLEDGEMENT);
    assert_ne!(mine[0].request_id, mine[1].request_id);
}

#[tokio::test]
async fn test_generation_sees_carried_facts() {
    let fleet = Fleet::new();
    let mut client = MockGenerationClient::new();
    client
        .expect_generate()
        .withf(|prompt: &str| !prompt.contains("CARRIED-OVER FACTS"))
        .times(1)
        .returning(|_| Ok("Order 7 is on its way.".to_string()));
    client
        .expect_generate()
        .withf(|prompt: &str| prompt.contains("CARRIED-OVER FACTS"))
        .times(1)
        .returning(|_| Ok("No refunds on that order.".to_string()));

    let orchestrator = Orchestrator::builder(fleet.registry())
        .synthesizer(Synthesizer::new(Arc::new(client), Duration::from_secs(1)))
        .build();

    let first = orchestrator.process_query("Where is my order 7?", Some(9)).await;
    let second = orchestrator.process_query("Any refund on it?", Some(9)).await;

    assert_eq!(first.narrative_response, "Order 7 is on its way.");
    assert_eq!(second.narrative_response, "No refunds on that order.");
}

#[tokio::test]
async fn test_overridden_facts_are_not_reported_as_carried() {
    let fleet = Fleet::new();
    let prompts = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let captured = Arc::clone(&prompts);
    let mut client = MockGenerationClient::new();
    client.expect_generate().times(3).returning(move |prompt| {
        captured.lock().push(prompt.to_string());
        Ok("Here is what I found.".to_string())
    });

    let orchestrator = Orchestrator::builder(fleet.registry())
        .synthesizer(Synthesizer::new(Arc::new(client), Duration::from_secs(1)))
        .build();

    orchestrator.process_query("Where is my order 7?", Some(1)).await;
    fleet.shop.set_result(resolved_order(42, "Lamp"));
    orchestrator.process_query("Where is my order 42?", Some(1)).await;
    orchestrator.process_query("payment details", Some(1)).await;

    let prompts = prompts.lock();
    assert!(!prompts[1].contains("CARRIED-OVER FACTS"));
    assert!(!prompts[1].contains("Widget"));

    let start = prompts[2].find("CARRIED-OVER FACTS").unwrap();
    let end = prompts[2].find("PROVIDER DATA").unwrap();
    let carried = &prompts[2][start..end];
    assert!(carried.contains("order_id: 42"));
    assert!(carried.contains("Lamp"));
    assert!(!carried.contains("user_id"));
}

#[tokio::test]
async fn test_query_completed_event() {
    let fleet = Fleet::new();
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = Orchestrator::builder(fleet.registry())
        .event_sink(sink.clone())
        .build();

    orchestrator.process_query("track my delivery", Some(5)).await;

    let completed = sink.events_of_type(QUERY_COMPLETED);
    assert_eq!(completed.len(), 1);
    let payload = completed[0].1.as_ref().unwrap();
    assert_eq!(payload["user_id"], 5);
    assert_eq!(payload["providers"], json!(["ShopCore", "ShipStream"]));
    assert!(sink.event_types().contains(&"stage.started".to_string()));
}

#[tokio::test]
async fn test_response_wire_shape() {
    let fleet = Fleet::new();
    let orchestrator = fleet.orchestrator();

    let response = orchestrator.process_query("Where is my order 7?", Some(1)).await;
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["agents_invoked"], json!(["ShopCore", "ShipStream"]));
    assert_eq!(json["data_sources"]["ShopCore"]["record_count"], 1);
    assert_eq!(json["data_sources"]["ShipStream"]["success"], true);
    assert!(json["timestamp"].as_str().unwrap().ends_with("+00:00"));
}

#[tokio::test]
async fn test_from_default_config_registers_unconfigured_providers() {
    let orchestrator = Orchestrator::from_config(&OrchestratorConfig::default()).unwrap();

    let status = orchestrator.agent_status();
    assert_eq!(status.len(), 4);
    assert!(status.values().all(|r| *r == Readiness::Unconfigured));

    let response = orchestrator.process_query("What did I order?", None).await;
    assert_eq!(
        response.data_sources[&ShopCore].error.as_deref(),
        Some("ShopCore is not configured")
    );
    assert_eq!(response.narrative_response, "ShopCore: Error occurred.");
}

#[test]
fn test_established_facts() {
    let before = Context::new().with("order_id", 7).with("product_name", "Widget");
    let after = before.clone().with("order_id", 8).with("user_id", 1);

    let delta = established_facts(&after, &before);

    assert_eq!(delta.to_json(), json!({"order_id": 8, "user_id": 1}));
}
