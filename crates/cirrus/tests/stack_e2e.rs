//! The full stack wired from configuration: a signed client listing a
//! container page by page, then downloading one of the listed blobs.

use cirrus::prelude::*;
use cirrus::transfer::MemorySink;
use cirrus_test::{json_response, status_response, MockTransport};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

const ACCOUNT_URL: &str = "https://account.blob.example.com";
// base64("secret-key")
const ACCESS_KEY: &str = "c2VjcmV0LWtleQ==";

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct Blob {
    name: String,
    size: u64,
}

struct Completions(parking_lot::Mutex<Vec<TransferId>>);

impl TransferDelegate for Completions {
    fn on_state_changed(&self, _: &Transfer, _: TransferState, _: Option<TransferProgress>) {}

    fn on_complete(&self, transfer: &Transfer) {
        self.0.lock().push(transfer.id);
    }

    fn on_failed(&self, _: &Transfer, _: &ClientError) {}

    fn on_batch_update(&self, _: &[Transfer]) {}
}

fn load_config() -> CirrusConfig {
    ConfigLoader::new()
        .with_string(
            r#"
                [client]
                base_url = "https://account.blob.example.com"
                api_version = "2019-02-02"
                allowed_headers = ["x-ms-range"]

                [client.retry]
                enabled = false

                [transfer]
                max_chunk_size_bytes = 3
                max_concurrent_chunks = 2
            "#,
            "toml",
        )
        .unwrap()
        .load()
        .unwrap()
}

#[tokio::test]
async fn test_list_then_download() {
    let config = load_config();
    let transport = Arc::new(
        MockTransport::new()
            .with_response(json_response(
                200,
                &json!({"items": [{"name": "a.txt", "size": 6}], "continuationToken": "photos?marker=2"}),
            ))
            .with_response(json_response(
                200,
                &json!({"items": [{"name": "b.txt", "size": 2}]}),
            ))
            .with_fallback(status_response(206).with_body("hel")),
    );

    let client = PipelineClient::builder(ACCOUNT_URL, transport.clone())
        .options(config.client_options())
        .access_key(ACCESS_KEY)
        .build()
        .unwrap();
    assert!(!client.pipeline().stage_names().contains(&"retry"));

    let url = client.format("{container}", [("container", "photos")]).unwrap();
    let request = client
        .request(Method::GET, &url, &BTreeMap::new(), Default::default(), None)
        .unwrap();
    let blobs: PagedCollection<Blob> =
        PagedCollection::fetch(&client, request, Context::new(), PagedCodingKeys::default())
            .await
            .unwrap();

    assert!(blobs.has_more_pages());
    assert_eq!(
        blobs.next_page().await.unwrap().unwrap(),
        vec![Blob { name: "b.txt".to_string(), size: 2 }]
    );
    assert!(!blobs.has_more_pages());
    assert_eq!(blobs.len(), 2);

    let listed = transport.requests();
    assert_eq!(listed[1].uri.to_string(), "https://account.blob.example.com/photos?marker=2");
    assert!(listed
        .iter()
        .all(|r| r.header("authorization").is_some_and(|h| h.starts_with("HMAC-SHA256 "))));

    let registry = Arc::new(ClientRegistry::new());
    let completions = Arc::new(Completions(parking_lot::Mutex::new(Vec::new())));
    registry.register("photos", Arc::downgrade(&completions) as Weak<dyn TransferDelegate>);
    let manager = TransferManager::new(config.transfer_options(), registry).unwrap();

    let listed_blobs = blobs.items();
    let first = &listed_blobs[0];
    let sink = Arc::new(MemorySink::new());
    let handler = Arc::new(RangeDownloadHandler::new(client.clone(), sink.clone()));
    let blob_url = client
        .format("photos/{blob}", [("blob", first.name.as_str())])
        .unwrap();

    // 6 bytes in chunks of 3: ranges 0-2 and 3-5.
    let id = manager.enqueue_download("photos", &blob_url, first.size, handler);
    manager.start(id).unwrap();
    let transfer = manager.wait(id).await.unwrap();

    assert_eq!(transfer.state, TransferState::Complete);
    assert_eq!(manager.chunks(id).unwrap().len(), 2);
    assert_eq!(sink.contents(), b"helhel");

    let mut ranges: Vec<String> = transport.requests()[2..]
        .iter()
        .filter_map(|r| r.header("x-ms-range").map(str::to_string))
        .collect();
    ranges.sort();
    assert_eq!(ranges, vec!["bytes=0-2", "bytes=3-5"]);
    assert_eq!(*completions.0.lock(), vec![id]);
}
