//! Wire-level tests for the HubSpot contact upsert flows.

use assert_json_diff::assert_json_eq;
use mockito::Matcher;
use serde_json::json;

use destination_common::error::DestinationError;
use destination_common::transaction::TransactionContext;
use destination_hubspot::client::{HubspotClient, HubspotSettings};
use destination_hubspot::config::HubspotConfig;
use destination_hubspot::upsert_contact::{perform, perform_batch, ContactPayload};

fn make_client(base_url: &str) -> HubspotClient {
    HubspotClient::new(
        &HubspotConfig::for_base_url(base_url),
        HubspotSettings {
            access_token: "test-token".to_string(),
        },
    )
}

fn contact(email: &str, lifecyclestage: Option<&str>) -> ContactPayload {
    serde_json::from_value(json!({
        "email": email,
        "firstname": "John",
        "lifecyclestage": lifecyclestage,
    }))
    .unwrap()
}

#[tokio::test]
async fn new_contacts_are_read_then_created_in_one_batch_each() {
    let mut server = mockito::Server::new_async().await;

    let read_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/read")
        .match_body(Matcher::Json(json!({
            "idProperty": "email",
            "properties": ["email", "lifecyclestage", "hs_additional_emails"],
            "inputs": [{"id": "a@x.io"}, {"id": "b@x.io"}, {"id": "c@x.io"}]
        })))
        .with_status(207)
        .with_body(
            json!({
                "status": "COMPLETE",
                "results": [],
                "numErrors": 1,
                "errors": [{
                    "status": "error",
                    "category": "OBJECT_NOT_FOUND",
                    "message": "Could not get some CONTACT objects",
                    "context": { "ids": ["a@x.io", "b@x.io", "c@x.io"] }
                }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let create_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/create")
        .with_status(201)
        .with_body(
            json!({
                "status": "COMPLETE",
                "results": [
                    { "id": "1", "properties": { "email": "a@x.io" } },
                    { "id": "2", "properties": { "email": "b@x.io" } },
                    { "id": "3", "properties": { "email": "c@x.io" } }
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let update_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/update")
        .expect(0)
        .create_async()
        .await;

    let client = make_client(&server.url());
    let mut tx = TransactionContext::new();
    let payloads = vec![
        contact("A@X.io", None),
        contact("b@x.io", None),
        contact("c@x.io", None),
    ];

    let outcome = perform_batch(&client, &payloads, &mut tx).await.unwrap();

    assert_eq!(outcome.len(), 3);
    assert!(outcome.records.iter().all(|r| r.result.is_success()));
    read_mock.assert_async().await;
    create_mock.assert_async().await;
    update_mock.assert_async().await;
}

#[tokio::test]
async fn existing_contacts_are_read_then_updated_in_one_batch() {
    let mut server = mockito::Server::new_async().await;

    let read_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/read")
        .with_status(200)
        .with_body(
            json!({
                "status": "COMPLETE",
                "results": [
                    { "id": "101", "properties": { "email": "a@x.io" } },
                    { "id": "102", "properties": { "email": "b@x.io" } }
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let update_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/update")
        .match_body(Matcher::PartialJson(json!({
            "inputs": [{ "id": "101" }, { "id": "102" }]
        })))
        .with_status(200)
        .with_body(
            json!({
                "status": "COMPLETE",
                "results": [
                    { "id": "101", "properties": { "email": "a@x.io", "lifecyclestage": null } },
                    { "id": "102", "properties": { "email": "b@x.io", "lifecyclestage": null } }
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let create_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/create")
        .expect(0)
        .create_async()
        .await;

    let client = make_client(&server.url());
    let mut tx = TransactionContext::new();
    let payloads = vec![contact("a@x.io", None), contact("b@x.io", None)];

    let outcome = perform_batch(&client, &payloads, &mut tx).await.unwrap();

    assert_eq!(outcome.len(), 2);
    assert_eq!(outcome.records[0].result.remote_id(), Some("101"));
    assert_eq!(outcome.records[1].result.remote_id(), Some("102"));
    assert_eq!(tx.get("contact_id"), Some("102"));

    read_mock.assert_async().await;
    update_mock.assert_async().await;
    create_mock.assert_async().await;
}

#[tokio::test]
async fn retained_lifecycle_stage_is_reset_then_reapplied() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", "/crm/v3/objects/contacts/batch/read")
        .with_status(200)
        .with_body(
            json!({
                "results": [{
                    "id": "101",
                    "properties": { "email": "a@x.io", "lifecyclestage": "opportunity" }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    // Primary update: HubSpot refuses the downgrade and echoes the old stage.
    let primary_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/update")
        .match_body(Matcher::PartialJson(json!({
            "inputs": [{ "id": "101", "properties": { "firstname": "John" } }]
        })))
        .with_status(200)
        .with_body(
            json!({
                "results": [{
                    "id": "101",
                    "properties": { "email": "a@x.io", "lifecyclestage": "opportunity" }
                }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let reset_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/update")
        .match_body(Matcher::Json(json!({
            "inputs": [{ "id": "101", "properties": { "lifecyclestage": "" } }]
        })))
        .with_status(200)
        .with_body(json!({ "results": [] }).to_string())
        .expect(1)
        .create_async()
        .await;

    let reapply_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/update")
        .match_body(Matcher::Json(json!({
            "inputs": [{ "id": "101", "properties": { "lifecyclestage": "lead" } }]
        })))
        .with_status(200)
        .with_body(json!({ "results": [] }).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = make_client(&server.url());
    let mut tx = TransactionContext::new();
    let payloads = vec![contact("a@x.io", Some("lead"))];

    let outcome = perform_batch(&client, &payloads, &mut tx).await.unwrap();
    assert_eq!(outcome.len(), 1);

    primary_mock.assert_async().await;
    reset_mock.assert_async().await;
    reapply_mock.assert_async().await;
}

#[tokio::test]
async fn fatal_read_errors_stop_the_batch_before_any_write() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", "/crm/v3/objects/contacts/batch/read")
        .with_status(207)
        .with_body(
            json!({
                "numErrors": 1,
                "errors": [{
                    "status": "error",
                    "category": "VALIDATION_ERROR",
                    "message": "idProperty is not a valid property",
                    "context": {}
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let create_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/create")
        .expect(0)
        .create_async()
        .await;
    let update_mock = server
        .mock("POST", "/crm/v3/objects/contacts/batch/update")
        .expect(0)
        .create_async()
        .await;

    let client = make_client(&server.url());
    let mut tx = TransactionContext::new();

    let err = perform_batch(&client, &[contact("a@x.io", None)], &mut tx)
        .await
        .unwrap_err();

    match err {
        DestinationError::FatalRemote { category, message, .. } => {
            assert_eq!(category, "VALIDATION_ERROR");
            assert_eq!(message, "idProperty is not a valid property");
        }
        other => panic!("expected FatalRemote, got {other:?}"),
    }
    create_mock.assert_async().await;
    update_mock.assert_async().await;
}

#[tokio::test]
async fn single_contact_update_404_falls_back_to_create() {
    let mut server = mockito::Server::new_async().await;

    let patch_mock = server
        .mock("PATCH", "/crm/v3/objects/contacts/vep@beri.dz")
        .match_query(Matcher::UrlEncoded("idProperty".into(), "email".into()))
        .with_status(404)
        .with_body(
            json!({
                "status": "error",
                "category": "OBJECT_NOT_FOUND",
                "message": "resource not found"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let post_mock = server
        .mock("POST", "/crm/v3/objects/contacts")
        .match_body(Matcher::PartialJson(json!({
            "properties": { "email": "vep@beri.dz", "firstname": "John" }
        })))
        .with_status(201)
        .with_body(
            json!({
                "id": "801",
                "properties": { "email": "vep@beri.dz", "firstname": "John" }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = make_client(&server.url());
    let mut tx = TransactionContext::new();

    let response = perform(&client, &contact("vep@beri.dz", None), &mut tx)
        .await
        .unwrap();

    assert_eq!(response.id, "801");
    assert_eq!(tx.get("contact_id"), Some("801"));
    assert_json_eq!(
        serde_json::to_value(&response.properties).unwrap(),
        json!({ "email": "vep@beri.dz", "firstname": "John" })
    );
    patch_mock.assert_async().await;
    post_mock.assert_async().await;
}

#[tokio::test]
async fn single_contact_lifecycle_stage_is_reset_then_reapplied() {
    let mut server = mockito::Server::new_async().await;

    // The primary update and the re-apply carry the same body; the reset
    // carries an empty lifecycle stage.
    let update_mock = server
        .mock("PATCH", "/crm/v3/objects/contacts/a@x.io")
        .match_query(Matcher::UrlEncoded("idProperty".into(), "email".into()))
        .match_body(Matcher::PartialJson(json!({
            "properties": { "lifecyclestage": "lead" }
        })))
        .with_status(200)
        .with_body(
            json!({
                "id": "101",
                "properties": { "lifecyclestage": "opportunity" }
            })
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let reset_mock = server
        .mock("PATCH", "/crm/v3/objects/contacts/a@x.io")
        .match_query(Matcher::UrlEncoded("idProperty".into(), "email".into()))
        .match_body(Matcher::PartialJson(json!({
            "properties": { "lifecyclestage": "" }
        })))
        .with_status(200)
        .with_body(json!({ "id": "101", "properties": {} }).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = make_client(&server.url());
    let mut tx = TransactionContext::new();

    perform(&client, &contact("a@x.io", Some("Lead")), &mut tx)
        .await
        .unwrap();

    assert_eq!(tx.get("contact_id"), Some("101"));
    update_mock.assert_async().await;
    reset_mock.assert_async().await;
}

#[tokio::test]
async fn single_contact_non_404_errors_propagate_verbatim() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("PATCH", "/crm/v3/objects/contacts/a@x.io")
        .match_query(Matcher::UrlEncoded("idProperty".into(), "email".into()))
        .with_status(400)
        .with_body(
            json!({
                "status": "error",
                "category": "VALIDATION_ERROR",
                "message": "No properties found to update, please provide at least one."
            })
            .to_string(),
        )
        .create_async()
        .await;

    let post_mock = server
        .mock("POST", "/crm/v3/objects/contacts")
        .expect(0)
        .create_async()
        .await;

    let client = make_client(&server.url());
    let mut tx = TransactionContext::new();

    let err = perform(&client, &contact("a@x.io", None), &mut tx)
        .await
        .unwrap_err();

    match err {
        DestinationError::FatalRemote {
            category, status, ..
        } => {
            assert_eq!(category, "VALIDATION_ERROR");
            assert_eq!(status, Some(400));
        }
        other => panic!("expected FatalRemote, got {other:?}"),
    }
    assert_eq!(tx.get("contact_id"), None);
    post_mock.assert_async().await;
}
