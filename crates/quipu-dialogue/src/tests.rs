use crate::{format, DialogueRouter};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use quipu_core::{
    analysis::Analysis,
    config::{DialogueConfig, MemoryConfig},
    entity::{EntityStatus, Task},
    error::QuipuError,
    message::IncomingMessage,
    traits::{Classifier, TaskMatch, TaskMatchOutcome},
};
use quipu_store::{
    ConfirmationKind, ConversationContext, PaginationCursor, PendingConfirmation, Store,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Scripted classifier: always returns the same analysis / match outcome.
struct StubClassifier {
    analysis: Analysis,
    matches: TaskMatchOutcome,
    fail: bool,
}

impl StubClassifier {
    fn unknown() -> Self {
        Self {
            analysis: Analysis::unknown(),
            matches: TaskMatchOutcome::default(),
            fail: false,
        }
    }

    fn with_analysis(v: serde_json::Value) -> Self {
        Self {
            analysis: Analysis::from_value(&v),
            ..Self::unknown()
        }
    }

    fn offline() -> Self {
        Self {
            fail: true,
            ..Self::unknown()
        }
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    fn name(&self) -> &str {
        "stub"
    }

    async fn classify(
        &self,
        _text: &str,
        _original: Option<&str>,
    ) -> Result<Analysis, QuipuError> {
        if self.fail {
            return Err(QuipuError::Classifier("stub offline".into()));
        }
        Ok(self.analysis.clone())
    }

    async fn match_task(
        &self,
        _text: &str,
        _tasks: &[Task],
    ) -> Result<TaskMatchOutcome, QuipuError> {
        if self.fail {
            return Err(QuipuError::Classifier("stub offline".into()));
        }
        Ok(self.matches.clone())
    }
}

async fn router_with(stub: StubClassifier) -> DialogueRouter {
    let store = Store::new(&MemoryConfig {
        db_path: ":memory:".to_string(),
    })
    .await
    .unwrap();
    DialogueRouter::new(store, Arc::new(stub), DialogueConfig::default())
}

fn incoming(user: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: Uuid::new_v4(),
        channel: "test".to_string(),
        sender_id: user.to_string(),
        sender_name: None,
        text: text.to_string(),
        timestamp: Utc::now(),
        reply_to: None,
        forwarded: false,
        reply_target: None,
    }
}

fn reply_msg(user: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        reply_to: Some("wamid.prior-list".to_string()),
        ..incoming(user, text)
    }
}

// --- Stage 3: pagination ---

#[tokio::test]
async fn test_next_without_state_is_static_terminal() {
    // Scenario C: no pending state at all.
    let router = router_with(StubClassifier::unknown()).await;
    let out = router.handle(&incoming("u1", "next")).await;
    assert_eq!(out.text, format::NO_MORE_ITEMS);
}

#[tokio::test]
async fn test_pagination_wins_over_live_confirmation() {
    // Stage order is strict: with both a live confirmation and a live
    // cursor, the literal "next" resolves as pagination.
    let router = router_with(StubClassifier::unknown()).await;
    let user = "u1";
    for i in 0..6 {
        router
            .store
            .create_task(user, &format!("Task {i}"), None, None)
            .await
            .unwrap();
    }
    let now = Utc::now();
    router
        .store
        .save_confirmation(&PendingConfirmation {
            user_id: user.to_string(),
            kind: ConfirmationKind::TaskUpdate,
            subject_id: "1".to_string(),
            pending_updates: json!({"status": "completed"}),
            original_text: "mark it done".to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(60),
        })
        .await
        .unwrap();
    router
        .store
        .save_cursor(&PaginationCursor {
            user_id: user.to_string(),
            entity_kind: quipu_core::analysis::EntityKind::Task,
            page_offset: 0,
            total_count: 6,
            filters: Default::default(),
            expires_at: now + Duration::minutes(10),
        })
        .await
        .unwrap();

    let out = router.handle(&incoming(user, "next")).await;
    assert!(out.text.contains("Your tasks"), "got: {}", out.text);
    assert!(out.text.contains("6–6 of 6"), "got: {}", out.text);

    // The confirmation survived; the exhausted cursor did not.
    assert!(router.store.load_confirmation(user).await.unwrap().is_some());
    assert!(router.store.load_cursor(user).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pagination_rewrites_position_maps() {
    let router = router_with(StubClassifier::with_analysis(json!({
        "intent": "get", "entity_type": "task"
    })))
    .await;
    let user = "u1";
    for i in 0..7 {
        router
            .store
            .create_task(user, &format!("Task {i}"), None, None)
            .await
            .unwrap();
    }

    let out = router.handle(&incoming(user, "show my tasks")).await;
    assert!(out.text.contains("1–5 of 7"), "got: {}", out.text);
    assert!(out.text.contains("Send *next* for more."));

    let ctx = router.store.load_context(user).await.unwrap().unwrap();
    assert_eq!(ctx.task_ids.len(), 5);
    for (i, id) in ctx.task_ids.iter().enumerate() {
        assert_eq!(ctx.task_positions.get(&(i + 1).to_string()), Some(id));
    }
    let first_page_ids = ctx.task_ids.clone();

    let out = router.handle(&incoming(user, "next")).await;
    assert!(out.text.contains("6–7 of 7"), "got: {}", out.text);

    // Context maps now describe the second page, index-aligned again.
    let ctx = router.store.load_context(user).await.unwrap().unwrap();
    assert_eq!(ctx.task_ids.len(), 2);
    for (i, id) in ctx.task_ids.iter().enumerate() {
        assert_eq!(ctx.task_positions.get(&(i + 1).to_string()), Some(id));
        assert!(!first_page_ids.contains(id));
    }

    // Exhausted: the cursor is gone and another "next" is terminal.
    assert!(router.store.load_cursor(user).await.unwrap().is_none());
    let out = router.handle(&incoming(user, "next")).await;
    assert_eq!(out.text, format::NO_MORE_ITEMS);
}

// --- Stage 2: reply to a shown list ---

#[tokio::test]
async fn test_reply_bulk_update_marks_referenced_orders() {
    // Scenario A: "mark 1 and 3 as done" against a three-order list.
    let router = router_with(StubClassifier::unknown()).await;
    let user = "u1";
    let mut orders = Vec::new();
    for product in ["Beans", "Milk", "Sugar"] {
        orders.push(
            router
                .store
                .create_order(user, product, 1, None)
                .await
                .unwrap(),
        );
    }
    router
        .store
        .save_context(&ConversationContext::from_orders(user, &orders))
        .await
        .unwrap();

    let out = router.handle(&reply_msg(user, "mark 1 and 3 as done")).await;
    assert!(out.text.contains("2 orders"), "got: {}", out.text);

    let o1 = router.store.get_order(user, &orders[0].id).await.unwrap().unwrap();
    let o2 = router.store.get_order(user, &orders[1].id).await.unwrap().unwrap();
    let o3 = router.store.get_order(user, &orders[2].id).await.unwrap().unwrap();
    assert_eq!(o1.status, EntityStatus::Completed);
    assert_eq!(o2.status, EntityStatus::Pending);
    assert_eq!(o3.status, EntityStatus::Completed);
}

#[tokio::test]
async fn test_reply_bare_done_uses_keyword_fallback() {
    // Scenario D: "done" never classifies, but the reply context makes it
    // an update — not stage 5's help text.
    let router = router_with(StubClassifier::unknown()).await;
    let user = "u1";
    let task = router
        .store
        .create_task(user, "Call the dentist", None, None)
        .await
        .unwrap();
    router
        .store
        .save_context(&ConversationContext::from_tasks(user, &[task.clone()]))
        .await
        .unwrap();

    let out = router.handle(&reply_msg(user, "done")).await;
    assert!(out.text.contains("Task updated"), "got: {}", out.text);

    let task = router.store.get_task(user, task.id).await.unwrap().unwrap();
    assert_eq!(task.status, EntityStatus::Completed);
}

#[tokio::test]
async fn test_reply_detail_view_resolves_ordinal() {
    let router = router_with(StubClassifier::unknown()).await;
    let user = "u1";
    let mut orders = Vec::new();
    for product in ["Beans", "Milk", "Sugar"] {
        orders.push(
            router
                .store
                .create_order(user, product, 1, None)
                .await
                .unwrap(),
        );
    }
    router
        .store
        .save_context(&ConversationContext::from_orders(user, &orders))
        .await
        .unwrap();

    let out = router
        .handle(&reply_msg(user, "show me details of the 2nd order"))
        .await;
    assert!(out.text.contains(&orders[1].id), "got: {}", out.text);
    assert!(out.text.contains("Milk"));
}

#[tokio::test]
async fn test_reply_without_context_falls_through_to_help() {
    // A reply reference with no stored context is just a fresh message.
    let router = router_with(StubClassifier::unknown()).await;
    let out = router.handle(&reply_msg("u1", "done")).await;
    assert_eq!(out.text, format::help());
}

// --- Stage 4: confirmations ---

#[tokio::test]
async fn test_expired_confirmation_falls_through_to_fresh() {
    // Replying "yes" after expiry must not resolve as a confirmation.
    let router = router_with(StubClassifier::unknown()).await;
    let user = "u1";
    let task = router
        .store
        .create_task(user, "Water plants", None, None)
        .await
        .unwrap();
    let now = Utc::now();
    router
        .store
        .save_confirmation(&PendingConfirmation {
            user_id: user.to_string(),
            kind: ConfirmationKind::TaskUpdate,
            subject_id: task.id.to_string(),
            pending_updates: json!({"status": "completed"}),
            original_text: "done with the plants".to_string(),
            created_at: now - Duration::minutes(90),
            expires_at: now - Duration::minutes(30),
        })
        .await
        .unwrap();

    let out = router.handle(&incoming(user, "yes")).await;
    assert_eq!(out.text, format::help());

    let task = router.store.get_task(user, task.id).await.unwrap().unwrap();
    assert_eq!(task.status, EntityStatus::Pending);
}

#[tokio::test]
async fn test_task_confirmation_yes_no_and_reprompt() {
    let router = router_with(StubClassifier::unknown()).await;
    let user = "u1";
    let task = router
        .store
        .create_task(user, "Water plants", None, None)
        .await
        .unwrap();
    let now = Utc::now();
    let pending = PendingConfirmation {
        user_id: user.to_string(),
        kind: ConfirmationKind::TaskUpdate,
        subject_id: task.id.to_string(),
        pending_updates: json!({"status": "completed"}),
        original_text: "done with the plants".to_string(),
        created_at: now,
        expires_at: now + Duration::minutes(60),
    };
    router.store.save_confirmation(&pending).await.unwrap();

    // Anything but yes/no re-asks and keeps the confirmation alive.
    let out = router.handle(&incoming(user, "hmm what?")).await;
    assert!(out.text.contains("Did you mean"), "got: {}", out.text);
    assert!(router.store.load_confirmation(user).await.unwrap().is_some());

    // "no" discards without touching the task.
    let out = router.handle(&incoming(user, "no")).await;
    assert_eq!(out.text, format::update_cancelled());
    assert!(router.store.load_confirmation(user).await.unwrap().is_none());
    let loaded = router.store.get_task(user, task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, EntityStatus::Pending);

    // "yes" applies the parked patch.
    router.store.save_confirmation(&pending).await.unwrap();
    let out = router.handle(&incoming(user, "yes")).await;
    assert!(out.text.contains("Task updated"), "got: {}", out.text);
    let loaded = router.store.get_task(user, task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, EntityStatus::Completed);
}

#[tokio::test]
async fn test_duplicate_gate_parks_instead_of_inserting() {
    // Two identical create requests never yield two pending rows.
    let analysis = json!({
        "intent": "create", "entity_type": "order",
        "parameters": {"product": "Coffee beans", "quantity": 2}
    });
    let router = router_with(StubClassifier::with_analysis(analysis)).await;
    let user = "u1";

    let out = router.handle(&incoming(user, "order 2 coffee beans")).await;
    assert!(out.text.contains("Order"), "got: {}", out.text);

    let out = router.handle(&incoming(user, "order 2 coffee beans")).await;
    assert!(out.text.contains("duplicate"), "got: {}", out.text);

    let (_, total) = router
        .store
        .get_orders(user, &Default::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(total, 1, "second attempt must not insert");
    let pending = router.store.load_confirmation(user).await.unwrap().unwrap();
    assert_eq!(pending.kind, ConfirmationKind::DuplicateOrder);

    // "new" creates the second order after all.
    let out = router.handle(&incoming(user, "new")).await;
    assert!(out.text.contains("created"), "got: {}", out.text);
    let (_, total) = router
        .store
        .get_orders(user, &Default::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert!(router.store.load_confirmation(user).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_decision_update_and_reprompt() {
    let analysis = json!({
        "intent": "create", "entity_type": "order",
        "parameters": {"product": "Candles", "quantity": 5}
    });
    let router = router_with(StubClassifier::with_analysis(analysis)).await;
    let user = "u1";

    router.handle(&incoming(user, "order 5 candles")).await;
    router.handle(&incoming(user, "order 5 candles")).await;

    // Garbage answer re-prompts, decision stays parked.
    let out = router.handle(&incoming(user, "what do you mean")).await;
    assert!(out.text.contains("*new*"), "got: {}", out.text);
    assert!(router.store.load_confirmation(user).await.unwrap().is_some());

    // "update" patches the existing order instead of inserting.
    let out = router.handle(&incoming(user, "update it please")).await;
    assert!(out.text.contains("updated"), "got: {}", out.text);
    let (_, total) = router
        .store
        .get_orders(user, &Default::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert!(router.store.load_confirmation(user).await.unwrap().is_none());
}

// --- Stage 1: forwarded override ---

#[tokio::test]
async fn test_forwarded_unknown_routes_to_order_creation() {
    // A forwarded product listing classifies as unknown but still becomes
    // an order.
    let analysis = json!({
        "intent": "unknown", "entity_type": "none",
        "parameters": {"product": "Scented candles", "quantity": 3}
    });
    let router = router_with(StubClassifier::with_analysis(analysis)).await;
    let msg = IncomingMessage {
        forwarded: true,
        ..incoming("u1", "Check these out! Scented candles 3-pack")
    };

    let out = router.handle(&msg).await;
    assert!(out.text.contains("Order"), "got: {}", out.text);
    let (_, total) = router
        .store
        .get_orders("u1", &Default::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
}

// --- Stage 5: fresh classification ---

#[tokio::test]
async fn test_unknown_intent_gets_help() {
    let router = router_with(StubClassifier::unknown()).await;
    let out = router.handle(&incoming("u1", "ehh?")).await;
    assert_eq!(out.text, format::help());
}

#[tokio::test]
async fn test_update_order_requires_explicit_id() {
    let analysis = json!({
        "intent": "update", "entity_type": "order",
        "parameters": {"status": "completed"}
    });
    let router = router_with(StubClassifier::with_analysis(analysis)).await;
    let out = router.handle(&incoming("u1", "mark my order as done")).await;
    assert_eq!(out.text, format::ask_order_id());
}

#[tokio::test]
async fn test_update_order_by_typed_id() {
    let analysis = json!({
        "intent": "update", "entity_type": "order",
        "parameters": {"status": "completed"}
    });
    let router = router_with(StubClassifier::with_analysis(analysis)).await;
    let user = "u1";
    let order = router
        .store
        .create_order(user, "Beans", 1, None)
        .await
        .unwrap();

    let text = format!("mark {} as done", order.id.to_lowercase());
    let out = router.handle(&incoming(user, &text)).await;
    assert!(out.text.contains("updated"), "got: {}", out.text);
    let loaded = router.store.get_order(user, &order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, EntityStatus::Completed);
}

#[tokio::test]
async fn test_fuzzy_task_update_parks_confirmation_when_shaky() {
    let analysis = json!({
        "intent": "update", "entity_type": "task",
        "parameters": {"status": "completed"}
    });
    let mut stub = StubClassifier::with_analysis(analysis);
    let router_store = Store::new(&MemoryConfig {
        db_path: ":memory:".to_string(),
    })
    .await
    .unwrap();
    let user = "u1";
    let task = router_store
        .create_task(user, "Call the dentist", None, None)
        .await
        .unwrap();
    // Shaky match: 0.7 < 0.8 forces a confirmation even though the
    // classifier claims none is needed.
    stub.matches = TaskMatchOutcome {
        best: Some(TaskMatch {
            task_id: task.id,
            confidence: 0.7,
            reason: "mentions the dentist".to_string(),
        }),
        all: vec![TaskMatch {
            task_id: task.id,
            confidence: 0.7,
            reason: "mentions the dentist".to_string(),
        }],
        needs_confirmation: false,
    };
    let router = DialogueRouter::new(router_store, Arc::new(stub), DialogueConfig::default());

    let out = router
        .handle(&incoming(user, "the dentist thing is done"))
        .await;
    assert!(out.text.contains("Did you mean"), "got: {}", out.text);
    let pending = router.store.load_confirmation(user).await.unwrap().unwrap();
    assert_eq!(pending.kind, ConfirmationKind::TaskUpdate);
    assert_eq!(pending.subject_id, task.id.to_string());

    // Task untouched until confirmed.
    let loaded = router.store.get_task(user, task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, EntityStatus::Pending);

    let out = router.handle(&incoming(user, "yes")).await;
    assert!(out.text.contains("Task updated"), "got: {}", out.text);
    let loaded = router.store.get_task(user, task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, EntityStatus::Completed);
}

#[tokio::test]
async fn test_fuzzy_task_update_applies_confident_match_directly() {
    let analysis = json!({
        "intent": "update", "entity_type": "task",
        "parameters": {"status": "completed"}
    });
    let mut stub = StubClassifier::with_analysis(analysis);
    let store = Store::new(&MemoryConfig {
        db_path: ":memory:".to_string(),
    })
    .await
    .unwrap();
    let user = "u1";
    let task = store
        .create_task(user, "Call the dentist", None, None)
        .await
        .unwrap();
    stub.matches = TaskMatchOutcome {
        best: Some(TaskMatch {
            task_id: task.id,
            confidence: 0.95,
            reason: "exact mention".to_string(),
        }),
        all: vec![TaskMatch {
            task_id: task.id,
            confidence: 0.95,
            reason: "exact mention".to_string(),
        }],
        needs_confirmation: false,
    };
    let router = DialogueRouter::new(store, Arc::new(stub), DialogueConfig::default());

    let out = router
        .handle(&incoming(user, "the dentist call is done"))
        .await;
    assert!(out.text.contains("Task updated"), "got: {}", out.text);
    assert!(router.store.load_confirmation(user).await.unwrap().is_none());
    let loaded = router.store.get_task(user, task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, EntityStatus::Completed);
}

#[tokio::test]
async fn test_fuzzy_task_update_no_candidate() {
    let analysis = json!({
        "intent": "update", "entity_type": "task",
        "parameters": {"status": "completed"}
    });
    let router = router_with(StubClassifier::with_analysis(analysis)).await;
    router
        .store
        .create_task("u1", "Call the dentist", None, None)
        .await
        .unwrap();

    let out = router
        .handle(&incoming("u1", "finish the quarterly report"))
        .await;
    assert_eq!(out.text, format::no_matching_task());
}

// --- Error degradation ---

#[tokio::test]
async fn test_classifier_failure_degrades_to_apology() {
    let router = router_with(StubClassifier::offline()).await;
    let out = router.handle(&incoming("u1", "order 2 coffee beans")).await;
    assert_eq!(out.text, format::apology());
}

#[tokio::test]
async fn test_classifier_failure_never_blocks_pagination() {
    // Stage 3 needs no classifier: "next" still answers while the LLM is down.
    let router = router_with(StubClassifier::offline()).await;
    let out = router.handle(&incoming("u1", "next")).await;
    assert_eq!(out.text, format::NO_MORE_ITEMS);
}
