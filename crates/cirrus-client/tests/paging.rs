//! Paging integration tests.
//!
//! These tests drive [`PagedCollection`] through a full client with the
//! standard stage stack in front of a scripted transport.

use cirrus_client::{ClientOptions, PagedCodingKeys, PagedCollection, PipelineClient};
use cirrus_core::{Context, HttpRequest, Method};
use cirrus_test::{json_response, MockTransport};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct Message {
    id: String,
}

fn messages(ids: &[&str]) -> Vec<Message> {
    ids.iter().map(|id| Message { id: (*id).to_string() }).collect()
}

fn page(ids: &[&str], token: Option<&str>) -> serde_json::Value {
    let items: Vec<_> = ids.iter().map(|id| json!({"id": id})).collect();
    match token {
        Some(token) => json!({"value": items, "nextLink": token}),
        None => json!({"value": items}),
    }
}

fn client(transport: &Arc<MockTransport>) -> PipelineClient {
    PipelineClient::builder("https://chat.example.com", transport.clone())
        .options(ClientOptions::new("2021-03-07").with_retry(None))
        .build()
        .unwrap()
}

fn keys() -> PagedCodingKeys {
    PagedCodingKeys::new("value", "nextLink")
}

fn list_request() -> HttpRequest {
    HttpRequest::parse(Method::GET, "https://chat.example.com/threads/t1/messages").unwrap()
}

#[tokio::test]
async fn test_pages_accumulate_in_order() {
    let transport = Arc::new(
        MockTransport::new()
            .with_response(json_response(200, &page(&["1", "2"], Some("/threads/t1/messages?page=2"))))
            .with_response(json_response(200, &page(&["3"], Some("/threads/t1/messages?page=3"))))
            .with_response(json_response(200, &page(&["4", "5"], Some("")))),
    );
    let client = client(&transport);

    let collection =
        PagedCollection::<Message>::fetch(&client, list_request(), Context::new(), keys())
            .await
            .unwrap();
    assert_eq!(collection.items(), messages(&["1", "2"]));

    let second = collection.next_page().await.unwrap().unwrap();
    assert_eq!(second, messages(&["3"]));
    assert_eq!(collection.len(), 3);

    let third = collection.next_page().await.unwrap().unwrap();
    assert_eq!(third, messages(&["4", "5"]));
    assert_eq!(collection.page_items(), messages(&["4", "5"]));

    assert_eq!(collection.next_page().await.unwrap(), None);
    assert_eq!(collection.items(), messages(&["1", "2", "3", "4", "5"]));
    assert_eq!(transport.call_count(), 3);

    let uris: Vec<String> = transport
        .requests()
        .iter()
        .map(|request| request.uri.to_string())
        .collect();
    assert_eq!(
        uris,
        vec![
            "https://chat.example.com/threads/t1/messages",
            "https://chat.example.com/threads/t1/messages?page=2",
            "https://chat.example.com/threads/t1/messages?page=3",
        ]
    );
}

#[tokio::test]
async fn test_next_item_fetches_exactly_one_extra_page() {
    let transport = Arc::new(
        MockTransport::new()
            .with_response(json_response(200, &page(&["a", "b"], Some("page2"))))
            .with_response(json_response(200, &page(&["c", "d", "e"], None))),
    );
    let client = client(&transport);
    let collection =
        PagedCollection::<Message>::fetch(&client, list_request(), Context::new(), keys())
            .await
            .unwrap();

    let mut seen = Vec::new();
    let mut calls_before_item = Vec::new();
    while let Some(message) = collection.next_item().await.unwrap() {
        seen.push(message.id);
        calls_before_item.push(transport.call_count());
    }

    assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(calls_before_item, vec![1, 1, 2, 2, 2]);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_concurrent_next_page_is_single_flight() {
    let transport = Arc::new(
        MockTransport::new()
            .with_response(json_response(200, &page(&["1"], Some("page2"))))
            .with_response(json_response(200, &page(&["2"], Some("page3"))))
            .with_response(json_response(200, &page(&["3"], None)))
            .with_delay(std::time::Duration::from_millis(10)),
    );
    let client = client(&transport);
    let collection = Arc::new(
        PagedCollection::<Message>::fetch(&client, list_request(), Context::new(), keys())
            .await
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let collection = Arc::clone(&collection);
            tokio::spawn(async move { collection.next_page().await.unwrap() })
        })
        .collect();

    let mut fetched = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            fetched += 1;
        }
    }

    assert_eq!(fetched, 2);
    assert_eq!(transport.call_count(), 3);
    assert_eq!(collection.items(), messages(&["1", "2", "3"]));
}

#[tokio::test]
async fn test_continuation_keeps_caller_headers() {
    let transport = Arc::new(
        MockTransport::new()
            .with_response(json_response(200, &page(&["1"], Some("page2"))))
            .with_response(json_response(200, &page(&["2"], None))),
    );
    let client = client(&transport);
    let request = list_request().with_header("x-tenant", "contoso").unwrap();

    let collection = PagedCollection::<Message>::fetch(&client, request, Context::new(), keys())
        .await
        .unwrap();
    collection.next_page().await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[1].header("x-tenant"), Some("contoso"));
    assert_ne!(
        requests[0].header("x-ms-client-request-id"),
        requests[1].header("x-ms-client-request-id")
    );
}
