use super::*;
use crate::audit::{DEFAULT_AUDIT_TABLE, StoreAuditSink};
use crate::query::{Clause, SortDirective};
use crate::spec::Operator;
use crate::store::{Databases, MemoryDatabase, MemoryStore, Record, Source};
use crate::test_support::RecordingEmbedder;
use chrono::TimeZone;
use serde_json::json;
use std::collections::HashMap;

struct Harness {
    store: Arc<MemoryStore>,
    embedder: Arc<RecordingEmbedder>,
    executor: ToolExecutor,
}

impl Harness {
    fn main_db(&self) -> Arc<MemoryDatabase> {
        self.store.database("main").unwrap()
    }

    async fn audit_rows(&self) -> Vec<Record> {
        self.main_db().rows(&Source::table(DEFAULT_AUDIT_TABLE)).await
    }

    async fn call(&self, tool: &str, arguments: serde_json::Value) -> Invocation {
        let arguments = arguments.as_object().cloned().unwrap_or_default();
        self.executor
            .execute(ToolCall::new(tool, arguments).with_client("client-7"))
            .await
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn catalog() -> Catalog {
    Catalog::from_json_str(
        &json!([
            {
                "name": "by_city",
                "table_name": "stores",
                "parameters": [{"param": "city", "attribute": "city", "required": true}],
                "limit": 5
            },
            {
                "name": "pants_search",
                "collection_name": "products",
                "parameters": [
                    {"param": "in_stock", "value": true, "attribute": "in_stock"},
                    {"param": "search_query", "attribute": "$vectorize"}
                ]
            },
            {
                "name": "semantic",
                "collection_name": "products",
                "parameters": [
                    {"param": "search_query", "attribute": "$vector",
                     "embedding_model": "text-embedding-3-small", "required": true}
                ],
                "projection": {"name": 1},
                "limit": 2
            },
            {
                "name": "recent_orders",
                "collection_name": "orders",
                "db_name": "legacy",
                "parameters": [
                    {"attribute": "created_at", "operator": "gte", "expr": "now() - days(7)"}
                ]
            },
            {
                "name": "broken",
                "collection_name": "orders",
                "db_name": "flaky"
            },
            {"name": "collections", "method": "list_collections"}
        ])
        .to_string(),
    )
    .unwrap()
}

async fn harness(embedder: Arc<RecordingEmbedder>) -> Harness {
    let store = Arc::new(
        MemoryStore::new("main")
            .with_database(
                MemoryDatabase::new("main")
                    .with_table(
                        "stores",
                        vec![
                            json!({"id": 1, "city": "Austin"}),
                            json!({"id": 2, "city": "Dallas"}),
                            json!({"id": 3, "city": "Austin"}),
                        ],
                    )
                    .with_collection(
                        "products",
                        vec![
                            json!({"_id": "p1", "name": "blue pants", "in_stock": true,
                                   "$vector": RecordingEmbedder::vector_for("blue pants")}),
                            json!({"_id": "p2", "name": "red hat", "in_stock": true,
                                   "$vector": RecordingEmbedder::vector_for("red hat")}),
                            json!({"_id": "p3", "name": "grey socks", "in_stock": false}),
                        ],
                    ),
            )
            .with_database(MemoryDatabase::new("legacy").with_collection(
                "orders",
                vec![
                    json!({"_id": "o1", "created_at": "2025-05-30T09:00:00.000Z"}),
                    json!({"_id": "o2", "created_at": "2025-05-01T09:00:00.000Z"}),
                ],
            ))
            .with_database(MemoryDatabase::new("flaky").with_collection("orders", vec![]).failing("socket closed")),
    );
    let databases = Arc::new(Databases::new(store.clone()));
    let recorder = AuditRecorder::new(Arc::new(StoreAuditSink::new(
        databases.clone(),
        DEFAULT_AUDIT_TABLE,
    )))
    .await;
    let executor = ToolExecutor::new(
        Arc::new(catalog()),
        Compiler::new(embedder.clone()),
        Dispatcher::new(databases),
        recorder,
    )
    .with_clock(fixed_now);

    Harness {
        store,
        embedder,
        executor,
    }
}

#[tokio::test]
async fn scenario_required_filter_reaches_dispatcher() {
    let h = harness(RecordingEmbedder::new()).await;
    let inv = h.call("by_city", json!({"city": "Austin"})).await;

    assert_eq!(inv.state, CallState::Completed);
    assert!(inv.envelope.success);
    assert_eq!(inv.envelope.count, 2);

    let queries = h.main_db().queries().await;
    assert_eq!(queries.len(), 1);
    let (source, descriptor) = &queries[0];
    assert_eq!(source, &Source::table("stores"));
    assert_eq!(
        serde_json::to_value(&descriptor.filter).unwrap(),
        json!({"city": {"equals": "Austin"}})
    );
    assert_eq!(descriptor.limit, 5);
}

#[tokio::test]
async fn scenario_static_filter_with_vectorize_sort() {
    let h = harness(RecordingEmbedder::new()).await;
    h.call("pants_search", json!({"search_query": "blue pants"})).await;

    let queries = h.main_db().queries().await;
    let (_, descriptor) = &queries[0];
    assert_eq!(
        descriptor.filter.as_ref().and_then(|f| f.get("in_stock")),
        Some(&Clause::new(Operator::Equals, json!(true)))
    );
    assert_eq!(descriptor.sort, Some(SortDirective::Vectorize("blue pants".into())));
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn scenario_unknown_tool_is_not_audited() {
    let h = harness(RecordingEmbedder::new()).await;
    let inv = h.call("nope", json!({})).await;

    assert_eq!(inv.state, CallState::Failed);
    assert_eq!(inv.run_id, None);
    assert_eq!(inv.envelope, ResultEnvelope::failure("Tool nope not found"));
    assert!(h.audit_rows().await.is_empty());
}

#[tokio::test]
async fn missing_required_parameter_skips_dispatch_and_audit() {
    let h = harness(RecordingEmbedder::new()).await;
    let inv = h.call("by_city", json!({"state": "TX"})).await;

    assert_eq!(inv.state, CallState::Failed);
    assert_eq!(inv.envelope.error.as_deref(), Some("Parameter city is required"));
    assert!(!inv.envelope.success);
    assert_eq!(h.store.find_count(), 0);
    assert!(h.audit_rows().await.is_empty());

    let inv = h.call("semantic", json!({"search_query": null})).await;
    assert_eq!(inv.envelope.error.as_deref(), Some("Parameter search_query is required"));

    let inv = h.call("semantic", json!({"search_query": ""})).await;
    assert_eq!(inv.envelope.error.as_deref(), Some("Parameter search_query is required"));
    assert_eq!(h.embedder.calls(), 0);
    assert!(h.audit_rows().await.is_empty());
}

#[tokio::test]
async fn static_clause_is_independent_of_arguments() {
    let h = harness(RecordingEmbedder::new()).await;
    h.call("pants_search", json!({})).await;
    h.call("pants_search", json!({"in_stock": false})).await;

    let queries = h.main_db().queries().await;
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].1.filter, queries[1].1.filter);
    assert_eq!(
        serde_json::to_value(&queries[0].1.filter).unwrap(),
        json!({"in_stock": {"equals": true}})
    );
}

#[tokio::test]
async fn embedding_search_returns_nearest_documents() {
    let h = harness(RecordingEmbedder::new()).await;
    let inv = h.call("semantic", json!({"search_query": "red hat"})).await;

    assert_eq!(inv.state, CallState::Completed);
    assert_eq!(
        h.embedder.requests(),
        vec![("red hat".to_string(), "text-embedding-3-small".to_string())]
    );
    assert_eq!(inv.envelope.count, 2);
    assert_eq!(inv.envelope.documents[0], json!({"_id": "p2", "name": "red hat"}).as_object().cloned().unwrap());
}

#[tokio::test]
async fn embedding_failure_is_reported_and_audited() {
    let h = harness(RecordingEmbedder::failing("quota exceeded")).await;
    let inv = h.call("semantic", json!({"search_query": "hats"})).await;

    assert_eq!(inv.state, CallState::Failed);
    assert_eq!(
        inv.envelope.error.as_deref(),
        Some("Failed to generate embedding: Provider error: quota exceeded")
    );
    assert_eq!(h.store.find_count(), 0);

    let rows = h.audit_rows().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["status"], "failed");
    assert_eq!(rows[1]["status_code"], 500);
}

#[tokio::test]
async fn backend_failure_is_reported_and_audited() {
    let h = harness(RecordingEmbedder::new()).await;
    let inv = h.call("broken", json!({})).await;

    assert_eq!(inv.state, CallState::Failed);
    assert_eq!(
        inv.envelope.error.as_deref(),
        Some("Failed to find documents: Backend error: socket closed")
    );
    let rows = h.audit_rows().await;
    assert_eq!(rows[1]["status"], "failed");
    assert_eq!(rows[1]["error"], "Failed to find documents: Backend error: socket closed");
}

#[tokio::test]
async fn expression_clause_uses_call_clock() {
    let h = harness(RecordingEmbedder::new()).await;
    let inv = h.call("recent_orders", json!({})).await;

    assert_eq!(inv.envelope.count, 1);
    assert_eq!(inv.envelope.documents[0]["_id"], "o1");
    let legacy = h.store.database("legacy").unwrap();
    let (_, descriptor) = &legacy.queries().await[0];
    assert_eq!(
        serde_json::to_value(&descriptor.filter).unwrap(),
        json!({"created_at": {"gte": "2025-05-25T12:00:00.000Z"}})
    );
}

#[tokio::test]
async fn list_collections_is_audited() {
    let h = harness(RecordingEmbedder::new()).await;
    let inv = h.call("collections", json!({})).await;

    assert_eq!(inv.state, CallState::Completed);
    assert_eq!(
        serde_json::to_value(&inv.envelope).unwrap(),
        json!({"success": true, "count": 1, "documents": [{"name": "products"}]})
    );
    let rows = h.audit_rows().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["tool_id"], "collections");
    assert_eq!(rows[1]["status"], "completed");
}

#[tokio::test]
async fn identical_calls_return_identical_documents() {
    let h = harness(RecordingEmbedder::new()).await;
    let a = h.call("by_city", json!({"city": "Austin"})).await;
    let b = h.call("by_city", json!({"city": "Austin"})).await;
    assert_eq!(a.envelope.documents, b.envelope.documents);
    assert_ne!(a.run_id, b.run_id);
}

#[tokio::test]
async fn every_terminal_row_follows_exactly_one_started_row() {
    let h = Arc::new(harness(RecordingEmbedder::new()).await);
    let calls = [
        ("by_city", json!({"city": "Austin"})),
        ("by_city", json!({"city": "Dallas"})),
        ("broken", json!({})),
        ("collections", json!({})),
        ("semantic", json!({"search_query": "pants"})),
        ("by_city", json!({})),
        ("ghost", json!({})),
    ];
    let tasks: Vec<_> = calls
        .into_iter()
        .map(|(tool, args)| {
            let h = h.clone();
            tokio::spawn(async move { h.call(tool, args).await })
        })
        .collect();
    let mut audited = 0;
    for task in tasks {
        if task.await.unwrap().run_id.is_some() {
            audited += 1;
        }
    }

    let rows = h.audit_rows().await;
    assert_eq!(rows.len(), audited * 2);

    let mut seen: HashMap<String, Vec<String>> = HashMap::new();
    for row in &rows {
        let run_id = row["run_id"].as_str().unwrap().to_string();
        let status = row["status"].as_str().unwrap().to_string();
        seen.entry(run_id).or_default().push(status);
    }
    assert_eq!(seen.len(), audited);
    for statuses in seen.values() {
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], "started");
        assert!(statuses[1] == "completed" || statuses[1] == "failed");
    }
}

#[tokio::test]
async fn disabled_audit_still_serves_calls() {
    let store = Arc::new(MemoryStore::new("main").with_database(
        MemoryDatabase::new("main").with_table("stores", vec![json!({"city": "Austin"})]),
    ));
    let databases = Arc::new(Databases::new(store.clone()));
    let executor = ToolExecutor::new(
        Arc::new(catalog()),
        Compiler::new(RecordingEmbedder::new()),
        Dispatcher::new(databases),
        AuditRecorder::disabled(),
    );
    let inv = executor
        .execute(ToolCall::new(
            "by_city",
            json!({"city": "Austin"}).as_object().cloned().unwrap(),
        ))
        .await;
    assert_eq!(inv.state, CallState::Completed);
    assert_eq!(inv.envelope.count, 1);
}
