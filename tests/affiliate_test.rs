//! Affiliate posts end to end: prompt building, batch passes and cleanup
//! over a mocked Gemini endpoint.

use std::sync::Arc;

use hermod::posts::{self, AffiliateProduct};
use hermod::{BatchGenerator, GeminiClient, RetryController, RetryPolicy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn candidate_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

fn toothbrush() -> AffiliateProduct {
    AffiliateProduct::from_tsv_line("電動歯ブラシ\thttps://s.test/abc.html\t3980\t4.5\t120\t5")
        .unwrap()
}

fn batch_for(server: &MockServer, retry_passes: u32) -> BatchGenerator {
    let client = GeminiClient::with_base_url("test_key", server.uri()).unwrap();
    let controller = RetryController::new(
        Arc::new(client),
        RetryPolicy::new().max_retries(1).jitter_max(0.0),
    );
    BatchGenerator::new(controller).retry_passes(retry_passes)
}

#[tokio::test]
async fn placeholder_completion_is_rerun_then_cleaned() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("[商品名]が最高")))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(candidate_body("今だけお得！\n#セール")),
        )
        .mount(&mock_server)
        .await;

    let batch = batch_for(&mock_server, 2);
    let lines = posts::generate_affiliate_posts(&batch, &[toothbrush()], 3).await;

    assert_eq!(lines, vec!["今だけお得！\\n#セール\\n\\nhttps://s.test/abc.html"]);
    assert!(!posts::is_failed_post(&lines[0]));

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("電動歯"));
    assert!(!body.contains("ブラシ"));
    assert!(body.contains("価格: 3980円"));
}

#[tokio::test]
async fn persistent_placeholder_becomes_error_line() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("【短縮URL】なし ○○○")))
        .mount(&mock_server)
        .await;

    let batch = batch_for(&mock_server, 2);
    let lines = posts::generate_affiliate_posts(&batch, &[toothbrush()], 80).await;

    assert_eq!(lines.len(), 1);
    assert!(posts::is_failed_post(&lines[0]));
    assert!(lines[0].contains("placeholder"));

    // One call per pass: the first round plus two retry passes.
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn products_keep_input_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("お買い得です")))
        .mount(&mock_server)
        .await;

    let products: Vec<AffiliateProduct> = ["a", "b", "c"]
        .iter()
        .map(|id| {
            AffiliateProduct::from_tsv_line(&format!("商品{id}\thttps://s.test/{id}.html")).unwrap()
        })
        .collect();

    let batch = batch_for(&mock_server, 0).workers(2);
    let lines = posts::generate_affiliate_posts(&batch, &products, 80).await;

    assert_eq!(
        lines,
        vec![
            "お買い得です\\n\\nhttps://s.test/a.html",
            "お買い得です\\n\\nhttps://s.test/b.html",
            "お買い得です\\n\\nhttps://s.test/c.html",
        ]
    );
}
