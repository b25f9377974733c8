use std::sync::Arc;

use serde_json::{Value, json};

use marketplace::services::api::PluginApi;
use marketplace::services::installation::InstallationService;

use crate::common::{
    TestApp, failing_manifest, inert_manifest, ledger_manifest, routes, slack_manifest,
};

#[tokio::test]
async fn dispatch_requires_permission() {
    let app = TestApp::spawn().await;
    let token = app.token("alice", &[]);

    let res = app
        .post_with_token(&routes::hook("onPaymentReceived"), &json!({"data": {}}), &token)
        .await;

    assert_eq!(res.status, 403);
}

#[tokio::test]
async fn failing_callback_does_not_stop_the_others() {
    let app = TestApp::spawn().await;
    let slack = app.catalog(slack_manifest()).await;
    let flaky = app.catalog(failing_manifest()).await;
    let token = app.token("alice", &["plugin:dispatch"]);
    app.install(slack.id, &token).await;
    app.install(flaky.id, &token).await;

    let res = app
        .post_with_token(
            &routes::hook("onPaymentReceived"),
            &json!({"data": {"amount": 250}}),
            &token,
        )
        .await;

    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.body["hook"], "onPaymentReceived");
    let results = res.body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.contains(&json!({"notified": "#general", "amount": 250})));
    assert!(results.contains(&json!({"error": "upstream rejected the event"})));
}

#[tokio::test]
async fn unknown_hook_yields_no_results() {
    let app = TestApp::spawn().await;
    let token = app.token("alice", &["plugin:dispatch"]);

    let res = app
        .post_with_token(&routes::hook("onNothing"), &json!({"data": {}}), &token)
        .await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["results"], json!([]));
}

#[tokio::test]
async fn callbacks_run_in_descending_priority() {
    let app = TestApp::spawn().await;
    let token = app.token("alice", &["plugin:dispatch"]);
    for (name, priority) in [("Five", 5), ("One", 1), ("Ten", 10)] {
        let entry = app.catalog(inert_manifest(name)).await;
        app.install(entry.id, &token).await;
        app.host
            .dispatcher()
            .register_fn(entry.id, "onInvoiceCreated", priority, move |_: &Value, _| {
                Ok(json!(priority))
            });
    }

    let res = app
        .post_with_token(&routes::hook("onInvoiceCreated"), &json!({"data": {}}), &token)
        .await;

    assert_eq!(res.body["results"], json!([10, 5, 1]));
}

#[tokio::test]
async fn disabled_and_foreign_installations_are_skipped() {
    let app = TestApp::spawn().await;
    let slack = app.catalog(slack_manifest()).await;
    let alice = app.token("alice", &["plugin:dispatch"]);
    let bob = app.token("bob", &["plugin:dispatch"]);
    let id = app.install(slack.id, &alice).await;

    let res = app
        .post_with_token(&routes::hook("onPaymentReceived"), &json!({"data": {}}), &bob)
        .await;
    assert_eq!(res.body["results"], json!([]));

    app.patch_with_token(&routes::installation(id), &json!({"is_active": false}), &alice)
        .await;
    let res = app
        .post_with_token(&routes::hook("onPaymentReceived"), &json!({"data": {}}), &alice)
        .await;
    assert_eq!(res.body["results"], json!([]));
}

#[tokio::test]
async fn executions_are_logged_newest_first() {
    let app = TestApp::spawn().await;
    let slack = app.catalog(slack_manifest()).await;
    let token = app.token("alice", &["plugin:dispatch"]);
    let id = app.install(slack.id, &token).await;

    for amount in [1, 2] {
        app.post_with_token(
            &routes::hook("onPaymentReceived"),
            &json!({"data": {"amount": amount}}),
            &token,
        )
        .await;
    }

    let res = app
        .get_with_token(&format!("{}?limit=2", routes::logs(id)), &token)
        .await;
    assert_eq!(res.status, 200);
    let logs = res.body.as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs[0]["id"].as_i64() > logs[1]["id"].as_i64());
    assert_eq!(logs[0]["level"], "info");
    assert_eq!(logs[0]["user_id"], "alice");
    assert!(logs[0]["execution_time_ms"].is_i64());
}

#[tokio::test]
async fn restore_rebuilds_registry_from_installations() {
    let app = TestApp::spawn().await;
    let slack = app.catalog(slack_manifest()).await;
    let unused = app.catalog(failing_manifest()).await;
    let token = app.token("alice", &[]);
    app.install(slack.id, &token).await;

    let restarted = Arc::new(TestApp::host(&app.db, &app.config));
    let restored = restarted.restore(&app.db).await.unwrap();

    assert_eq!(restored, 1);
    assert!(restarted.registry().is_registered(slack.id));
    assert!(!restarted.registry().is_registered(unused.id));
    let results = restarted
        .dispatch(&app.db, "onPaymentReceived", &json!({"amount": 5}), "alice")
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(results).unwrap(),
        json!([{"notified": "#general", "amount": 5}])
    );
}

#[tokio::test]
async fn hooks_reach_storage_through_their_installation() {
    let app = TestApp::spawn().await;
    let ledger = app.catalog(ledger_manifest(&["storage"])).await;
    let token = app.token("alice", &["plugin:dispatch"]);
    let id = app.install(ledger.id, &token).await;

    for (amount, total) in [(5, 5), (7, 12)] {
        let res = app
            .post_with_token(
                &routes::hook("onPaymentReceived"),
                &json!({"data": {"amount": amount}}),
                &token,
            )
            .await;
        assert_eq!(res.body["results"], json!([{"total": total}]));
    }

    let api = PluginApi::for_installation(app.db.clone(), app.host.clone(), id, "alice")
        .await
        .unwrap();
    assert_eq!(api.storage_get("total").await.unwrap(), Some(json!(12)));
}

#[tokio::test]
async fn hook_calls_are_held_to_installation_permissions() {
    let app = TestApp::spawn().await;
    let ledger = app.catalog(ledger_manifest(&[])).await;
    let token = app.token("alice", &["plugin:dispatch"]);
    app.install(ledger.id, &token).await;

    let res = app
        .post_with_token(
            &routes::hook("onPaymentReceived"),
            &json!({"data": {"amount": 5}}),
            &token,
        )
        .await;

    assert_eq!(res.status, 200);
    let error = res.body["results"][0]["error"].as_str().unwrap();
    assert!(error.contains("lacks 'storage'"), "{error}");
}

#[tokio::test]
async fn inactive_installation_gets_hooks_back_after_restart() {
    let app = TestApp::spawn().await;
    let slack = app.catalog(slack_manifest()).await;
    let token = app.token("alice", &[]);
    let id = app.install(slack.id, &token).await;
    app.patch_with_token(&routes::installation(id), &json!({"is_active": false}), &token)
        .await;

    let restarted = Arc::new(TestApp::host(&app.db, &app.config));
    assert_eq!(restarted.restore(&app.db).await.unwrap(), 1);
    InstallationService::new(&app.db, &restarted)
        .toggle_plugin(id, "alice", true)
        .await
        .unwrap();

    let results = restarted
        .dispatch(&app.db, "onPaymentReceived", &json!({"amount": 5}), "alice")
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(!results[0].is_error());
}

#[tokio::test]
async fn reactivation_registers_an_unloaded_plugin() {
    let app = TestApp::spawn().await;
    let slack = app.catalog(slack_manifest()).await;
    let token = app.token("alice", &[]);
    let id = app.install(slack.id, &token).await;
    app.patch_with_token(&routes::installation(id), &json!({"is_active": false}), &token)
        .await;

    let restarted = Arc::new(TestApp::host(&app.db, &app.config));
    assert!(!restarted.registry().is_registered(slack.id));

    InstallationService::new(&app.db, &restarted)
        .toggle_plugin(id, "alice", true)
        .await
        .unwrap();

    assert!(restarted.registry().is_registered(slack.id));
    let results = restarted
        .dispatch(&app.db, "onPaymentReceived", &json!({"amount": 5}), "alice")
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(results).unwrap(),
        json!([{"notified": "#general", "amount": 5}])
    );
}
