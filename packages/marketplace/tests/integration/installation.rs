use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

use marketplace::entity::{plugin, plugin_installation, plugin_log, plugin_setting, plugin_storage};
use marketplace::services::api::PluginApi;

use crate::common::{TestApp, inert_manifest, routes, slack_manifest};

async fn install_count(app: &TestApp, plugin_id: i32) -> i32 {
    plugin::Entity::find_by_id(plugin_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
        .install_count
}

mod install {
    use super::*;

    #[tokio::test]
    async fn creates_installation_with_seeded_settings() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(slack_manifest()).await;
        let token = app.token("alice", &[]);

        let id = app.install(entry.id, &token).await;

        let res = app.get_with_token(&routes::installation(id), &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["is_active"], true);
        assert_eq!(res.body["is_enabled"], true);
        assert_eq!(res.body["version"], "1.0.0");
        assert_eq!(
            res.body["permissions"],
            json!(["notifications:send", "storage", "invoices:read"])
        );
        assert_eq!(res.body["settings"]["channel"], "#general");
        assert_eq!(install_count(&app, entry.id).await, 1);
    }

    #[tokio::test]
    async fn unknown_plugin_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.token("alice", &[]);

        let res = app.post_with_token(&routes::install(999), &json!({}), &token).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn second_install_conflicts_and_leaves_one_row() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(slack_manifest()).await;
        let token = app.token("alice", &[]);
        let id = app.install(entry.id, &token).await;

        let res = app.post_with_token(&routes::install(entry.id), &json!({}), &token).await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "CONFLICT");
        let rows = plugin_installation::Entity::find()
            .filter(plugin_installation::Column::PluginId.eq(entry.id))
            .count(&app.db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let settings = plugin_setting::Entity::find()
            .filter(plugin_setting::Column::InstallationId.eq(id))
            .count(&app.db)
            .await
            .unwrap();
        assert_eq!(settings, 3);
        assert_eq!(install_count(&app, entry.id).await, 1);
    }

    #[tokio::test]
    async fn invalid_stored_manifest_is_rejected_without_side_effects() {
        let app = TestApp::spawn().await;
        let mut manifest = slack_manifest();
        manifest.as_object_mut().unwrap().remove("main");
        let entry = app.catalog_raw(3, manifest).await;
        let token = app.token("alice", &[]);

        let res = app.post_with_token(&routes::install(entry.id), &json!({}), &token).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert_eq!(plugin_installation::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(plugin_setting::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(install_count(&app, entry.id).await, 0);
    }

    #[tokio::test]
    async fn plugin_without_implementation_still_installs() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(inert_manifest("Ledger Export")).await;
        let token = app.token("alice", &[]);

        app.install(entry.id, &token).await;

        assert!(!app.host.registry().is_registered(entry.id));
    }
}

mod uninstall {
    use super::*;

    #[tokio::test]
    async fn install_count_tracks_interleaved_installs() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(slack_manifest()).await;
        let alice = app.token("alice", &[]);
        let bob = app.token("bob", &[]);
        let carol = app.token("carol", &[]);

        let a = app.install(entry.id, &alice).await;
        let b = app.install(entry.id, &bob).await;
        assert_eq!(
            app.delete_with_token(&routes::installation(a), &alice).await.status,
            204
        );
        app.install(entry.id, &carol).await;
        app.install(entry.id, &alice).await;
        assert_eq!(
            app.delete_with_token(&routes::installation(b), &bob).await.status,
            204
        );

        assert_eq!(install_count(&app, entry.id).await, 2);

        let res = app.delete_with_token(&routes::installation(b), &bob).await;
        assert_eq!(res.status, 404);
        assert_eq!(install_count(&app, entry.id).await, 2);
    }

    #[tokio::test]
    async fn removes_settings_logs_and_storage() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(slack_manifest()).await;
        let token = app.token("alice", &["plugin:dispatch"]);
        let id = app.install(entry.id, &token).await;

        let api = PluginApi::for_installation(app.db.clone(), app.host.clone(), id, "alice")
            .await
            .unwrap();
        api.storage_set("cursor", json!({"page": 2})).await.unwrap();
        app.post_with_token(
            &routes::hook("onPaymentReceived"),
            &json!({"data": {"amount": 10}}),
            &token,
        )
        .await;
        let logs = plugin_log::Entity::find()
            .filter(plugin_log::Column::InstallationId.eq(id))
            .count(&app.db)
            .await
            .unwrap();
        assert!(logs > 0);

        let res = app.delete_with_token(&routes::installation(id), &token).await;
        assert_eq!(res.status, 204);

        assert!(plugin_installation::Entity::find_by_id(id).one(&app.db).await.unwrap().is_none());
        for (table, remaining) in [
            (
                "plugin_setting",
                plugin_setting::Entity::find()
                    .filter(plugin_setting::Column::InstallationId.eq(id))
                    .count(&app.db)
                    .await
                    .unwrap(),
            ),
            (
                "plugin_log",
                plugin_log::Entity::find()
                    .filter(plugin_log::Column::InstallationId.eq(id))
                    .count(&app.db)
                    .await
                    .unwrap(),
            ),
            (
                "plugin_storage",
                plugin_storage::Entity::find()
                    .filter(plugin_storage::Column::InstallationId.eq(id))
                    .count(&app.db)
                    .await
                    .unwrap(),
            ),
        ] {
            assert_eq!(remaining, 0, "{table} rows survived uninstall");
        }
        assert_eq!(install_count(&app, entry.id).await, 0);

        let listed = app.get_with_token(routes::INSTALLATIONS, &token).await;
        assert_eq!(listed.status, 200);
        assert_eq!(listed.body, json!([]));
    }

    #[tokio::test]
    async fn last_uninstall_unregisters_hooks() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(slack_manifest()).await;
        let alice = app.token("alice", &[]);
        let bob = app.token("bob", &[]);
        let a = app.install(entry.id, &alice).await;
        let b = app.install(entry.id, &bob).await;
        assert_eq!(app.host.dispatcher().hook_count("onPaymentReceived"), 1);

        app.delete_with_token(&routes::installation(a), &alice).await;
        assert_eq!(app.host.dispatcher().hook_count("onPaymentReceived"), 1);

        app.delete_with_token(&routes::installation(b), &bob).await;
        assert_eq!(app.host.dispatcher().hook_count("onPaymentReceived"), 0);
        assert!(!app.host.registry().is_registered(entry.id));
    }
}

mod toggle {
    use super::*;

    #[tokio::test]
    async fn sets_both_flags_and_is_idempotent() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(slack_manifest()).await;
        let token = app.token("alice", &[]);
        let id = app.install(entry.id, &token).await;

        for _ in 0..2 {
            let res = app
                .patch_with_token(&routes::installation(id), &json!({"is_active": false}), &token)
                .await;
            assert_eq!(res.status, 200);
            assert_eq!(res.body["is_active"], false);
            assert_eq!(res.body["is_enabled"], false);
        }

        let res = app
            .patch_with_token(&routes::installation(id), &json!({"is_active": true}), &token)
            .await;
        assert_eq!(res.body["is_active"], true);
        assert_eq!(res.body["is_enabled"], true);
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(slack_manifest()).await;
        let token = app.token("alice", &[]);
        let id = app.install(entry.id, &token).await;

        let res = app
            .patch_with_token(&routes::installation(id), &json!({"is_active": "yes"}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod ownership {
    use super::*;

    #[tokio::test]
    async fn listing_only_shows_own_installations() {
        let app = TestApp::spawn().await;
        let slack = app.catalog(slack_manifest()).await;
        let ledger = app.catalog(inert_manifest("Ledger Export")).await;
        let alice = app.token("alice", &[]);
        let bob = app.token("bob", &[]);
        app.install(slack.id, &alice).await;
        app.install(ledger.id, &alice).await;
        app.install(slack.id, &bob).await;

        let res = app.get_with_token(routes::INSTALLATIONS, &alice).await;

        assert_eq!(res.status, 200);
        let names: Vec<&str> = res
            .body
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["plugin_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Slack Notifier", "Ledger Export"]);
    }

    #[tokio::test]
    async fn other_users_installation_is_invisible() {
        let app = TestApp::spawn().await;
        let entry = app.catalog(slack_manifest()).await;
        let alice = app.token("alice", &[]);
        let mallory = app.token("mallory", &[]);
        let id = app.install(entry.id, &alice).await;

        let get = app.get_with_token(&routes::installation(id), &mallory).await;
        let settings = app.get_with_token(&routes::settings(id), &mallory).await;
        let update = app
            .put_with_token(
                &routes::settings(id),
                &json!({"settings": {"channel": "#leak"}}),
                &mallory,
            )
            .await;
        let logs = app.get_with_token(&routes::logs(id), &mallory).await;
        let toggle = app
            .patch_with_token(&routes::installation(id), &json!({"is_active": false}), &mallory)
            .await;
        let delete = app.delete_with_token(&routes::installation(id), &mallory).await;

        for res in [get, settings, update, logs, toggle, delete] {
            assert_eq!(res.status, 404);
            assert_eq!(res.body["code"], "NOT_FOUND");
        }

        let res = app.get_with_token(&routes::installation(id), &alice).await;
        assert_eq!(res.body["is_active"], true);
        assert_eq!(res.body["settings"]["channel"], "#general");
    }
}
