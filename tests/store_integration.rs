//! Template store and configuration registry integration tests
//!
//! These tests run both stores over a shared memory backend, seeded with the
//! embedded fixture, and exercise them the way a bot process would.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_test::{assert_pending, assert_ready};

use bot_content_store::config::RegistryConfig;
use bot_content_store::registry::{parse_bool, parse_duration_secs, parse_int, parse_url, ConfigRegistry, RegistryError};
use bot_content_store::seed::{default_seed, Seeder};
use bot_content_store::storage::{DocumentBackend, MemoryBackend, StorageError};
use bot_content_store::template::{Template, TemplateError, TemplateStore};

const TIMEOUT: Duration = Duration::from_secs(1);

struct TestEnvironment {
    backend: Arc<MemoryBackend>,
    templates: Arc<TemplateStore>,
    registry: Arc<ConfigRegistry>,
}

/// Both stores over one memory backend, seeded with the default fixture
async fn seeded_environment() -> TestEnvironment {
    let backend = Arc::new(MemoryBackend::new());
    let shared: Arc<dyn DocumentBackend> = backend.clone();

    let templates = Arc::new(TemplateStore::new(shared.clone(), TIMEOUT));
    let registry = Arc::new(ConfigRegistry::new(
        shared.clone(),
        TIMEOUT,
        &RegistryConfig::default(),
    ));

    let data = default_seed().unwrap();
    Seeder::new(templates.clone(), registry.clone(), shared, TIMEOUT)
        .run(&data)
        .await
        .unwrap();

    TestEnvironment {
        backend,
        templates,
        registry,
    }
}

// ============================================================================
// Rendering
// ============================================================================

#[tokio::test]
async fn test_render_seeded_template() {
    let env = seeded_environment().await;

    let template = env.templates.get_by_route("/keyboard").unwrap();
    let text = template.render(&HashMap::from([("USER", "Alice")]));

    assert!(text.contains("Alice!"));
    assert!(!text.contains("${USER}"));
}

#[tokio::test]
async fn test_missing_binding_stays_literal() {
    let env = seeded_environment().await;

    let template = env.templates.get_by_route("/product").unwrap();
    let text = template.render(&HashMap::from([("PRODUCT", "Tea"), ("CITY", "Oslo")]));

    assert!(text.contains("Tea"));
    assert!(text.contains("Oslo"));
    assert!(text.contains("${PRICE}"));
}

#[tokio::test]
async fn test_empty_bindings_return_body() {
    let env = seeded_environment().await;
    let empty: HashMap<String, String> = HashMap::new();

    for template in env.templates.list(false) {
        assert_eq!(template.render(&empty), template.body, "{}", template.route);
    }
}

#[tokio::test]
async fn test_dollar_prefixed_placeholder() {
    let env = seeded_environment().await;

    let rendered = env
        .templates
        .render_route("/balance-income", &HashMap::from([("USD_AMOUNT", "12.50")]))
        .unwrap();

    assert!(rendered.text.contains("($12.50)"));
    assert!(rendered.unresolved.contains(&"TXID".to_string()));
    assert!(!rendered.unresolved.contains(&"USD_AMOUNT".to_string()));
}

// ============================================================================
// Template lifecycle
// ============================================================================

#[tokio::test]
async fn test_upsert_then_get_by_route() {
    let env = seeded_environment().await;

    let mut template = env.templates.get_by_route("/banned").unwrap();
    template.title = "Account suspended".to_string();
    template.body = "<p>Suspended until ${BANNED_UNTIL}</p>".to_string();
    env.templates.upsert(template.clone()).await.unwrap();

    let found = env.templates.get_by_route("/banned").unwrap();
    assert_eq!(found.id, template.id);
    assert_eq!(found.title, "Account suspended");
    assert_eq!(found.body, "<p>Suspended until ${BANNED_UNTIL}</p>");
}

#[tokio::test]
async fn test_route_conflict_with_seeded_template() {
    let env = seeded_environment().await;
    let owner = env.templates.get_by_route("/start").unwrap();

    let result = env
        .templates
        .upsert(Template::new("/start", "Another start", "<p>hi</p>"))
        .await;

    match result {
        Err(TemplateError::Conflict { route, existing_id }) => {
            assert_eq!(route, "/start");
            assert_eq!(existing_id, owner.id);
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_soft_delete_then_lookup() {
    let env = seeded_environment().await;
    let template = env.templates.get_by_route("/orders-cancelled").unwrap();

    env.templates.soft_delete(template.id).await.unwrap();

    assert!(matches!(
        env.templates.get_by_route("/orders-cancelled"),
        Err(TemplateError::NotFound(_))
    ));
    assert_eq!(env.templates.list(false).len(), 16);
    assert_eq!(env.templates.list(true).len(), 17);
}

#[tokio::test]
async fn test_restart_sees_persisted_state() {
    let env = seeded_environment().await;
    let template = env.templates.get_by_route("/address-empty").unwrap();
    env.templates.soft_delete(template.id).await.unwrap();
    env.registry.set("spam.ban", "1000").await.unwrap();

    let shared: Arc<dyn DocumentBackend> = env.backend.clone();
    let templates = TemplateStore::new(shared.clone(), TIMEOUT);
    let registry = ConfigRegistry::new(shared, TIMEOUT, &RegistryConfig::default());
    templates.load().await.unwrap();
    registry.load().await.unwrap();

    assert!(templates.get_by_route("/address-empty").is_err());
    assert!(templates.get(template.id).await.unwrap().deleted);
    assert_eq!(registry.get("spam.ban").await.unwrap(), "1000");
    assert_eq!(registry.len(), 11);
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_typed_lookup_of_seeded_setting() {
    let env = seeded_environment().await;

    assert_eq!(env.registry.get_typed("order.timeout", parse_int).await.unwrap(), 60);
    assert_eq!(
        env.registry
            .get_typed("order.timeout", parse_duration_secs)
            .await
            .unwrap(),
        Duration::from_secs(60)
    );
    assert!(env.registry.get_typed("bot.state", parse_bool).await.unwrap());
    assert!(env.registry.get_typed("bot.image", parse_url).await.is_ok());

    assert!(matches!(
        env.registry.get_typed("order.timeout", parse_bool).await,
        Err(RegistryError::Parse { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_readers_see_update() {
    let env = seeded_environment().await;
    env.registry.set("bot.message", "Bot unavailable").await.unwrap();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let registry = env.registry.clone();
            tokio::spawn(async move { registry.get("bot.message").await })
        })
        .collect();

    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap(), "Bot unavailable");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_never_torn_during_writes() {
    let env = seeded_environment().await;
    let values = ["alpha", "bravo", "charlie", "delta"];

    let writer = {
        let registry = env.registry.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                registry
                    .set("bot.message", values[i % values.len()])
                    .await
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = env.registry.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let value = registry.get("bot.message").await.unwrap();
                    assert!(
                        value == "The bot is temporarily unavailable!" || values.contains(&value.as_str()),
                        "unexpected value {:?}",
                        value
                    );
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn test_watch_prefix_delivery() {
    let env = seeded_environment().await;
    let mut spam = tokio_test::task::spawn(env.registry.watch("spam."));

    assert_pending!(spam.poll_next());

    env.registry.set("bot.token", "000:rotated").await.unwrap();
    assert_pending!(spam.poll_next());

    env.registry.set("spam.ban", "1000").await.unwrap();
    assert!(spam.is_woken());
    let change = assert_ready!(spam.poll_next()).unwrap();
    assert_eq!(change.key, "spam.ban");
    assert_eq!(change.value, "1000");
}

#[tokio::test]
async fn test_watch_same_key_order() {
    let env = seeded_environment().await;
    let changes = env.registry.watch("order.");

    let writers: Vec<_> = (0..10)
        .map(|i| {
            let registry = env.registry.clone();
            tokio::spawn(async move { registry.set("order.timeout", i.to_string()).await })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    let versions: Vec<u64> = changes.take(10).map(|c| c.version).collect().await;
    let mut sorted = versions.clone();
    sorted.sort_unstable();
    assert_eq!(versions, sorted);

    // The last event carries the stored value
    let stored = env.registry.get_setting("order.timeout").await.unwrap();
    assert_eq!(stored.version, *versions.last().unwrap());
}

#[tokio::test]
async fn test_independent_subscribers() {
    let env = seeded_environment().await;
    let mut first = Box::pin(env.registry.watch("payment."));
    let mut second = Box::pin(env.registry.watch("payment."));
    assert_eq!(env.registry.subscriber_count(), 2);

    env.registry.set("payment.min_confirmations", "3").await.unwrap();

    assert_eq!(first.next().await.unwrap().value, "3");
    assert_eq!(second.next().await.unwrap().value, "3");

    drop(first);
    assert_eq!(env.registry.subscriber_count(), 1);
}

#[tokio::test]
async fn test_export_excludes_sensitive_keys() {
    let env = seeded_environment().await;
    let exported = env.registry.export();

    assert!(!exported.contains_key("bot.token"));
    assert_eq!(exported.get("order.timeout").map(String::as_str), Some("60"));
    assert_eq!(exported.len(), 10);
}

// ============================================================================
// Backend failures
// ============================================================================

#[tokio::test]
async fn test_slow_backend_times_out() {
    let env = seeded_environment().await;
    env.backend.set_latency(Duration::from_millis(200));

    let registry = ConfigRegistry::new(
        env.backend.clone(),
        Duration::from_millis(20),
        &RegistryConfig::default(),
    );

    assert!(matches!(
        registry.set("bot.state", "0").await,
        Err(RegistryError::Backend(StorageError::Timeout { .. }))
    ));
}

#[tokio::test]
async fn test_unavailable_backend_keeps_cache_serving() {
    let env = seeded_environment().await;
    env.backend.set_unavailable(true);

    // Cached reads keep working
    assert!(env.templates.get_by_route("/start").is_ok());
    assert_eq!(env.registry.get("spam.ban").await.unwrap(), "999");

    // Writes fail without changing the cache
    assert!(env.registry.set("spam.ban", "1").await.is_err());
    assert_eq!(env.registry.get("spam.ban").await.unwrap(), "999");
}
