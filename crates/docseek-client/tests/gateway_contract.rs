//! Request/response contract tests for `GatewayClient`.
//!
//! Each test stands up a `wiremock` server playing the backend and checks
//! both the request the client sends and how it reads the reply.

use docseek_client::{
    ChatError, ChatSession, ClientConfig, ClientError, GatewayClient, PageOutcome,
    ResourceController, SearchController, TurnOutcome, ERROR_FALLBACK_MESSAGE,
};
use docseek_core::SearchRequest;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> GatewayClient {
    GatewayClient::new(&ClientConfig::with_base_url(server.uri())).unwrap()
}

fn search_page(first: usize, count: usize, offset: usize, has_more: bool) -> serde_json::Value {
    let results: Vec<_> = (first..first + count)
        .map(|n| {
            json!({
                "text": format!("passage {n}"),
                "metadata": {
                    "file_name": "tax-guide.pdf",
                    "page_number": n,
                    "resource_id": "res-1",
                    "chunk_id": format!("chunk-{n}")
                },
                "rerank_score": 0.91,
                "vector_score": 0.77
            })
        })
        .collect();
    json!({
        "query": "tax",
        "results": results,
        "total_found": 25,
        "search_time_ms": 31.4,
        "has_more": has_more,
        "offset": offset,
        "limit": 10
    })
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn search_sends_request_body_and_parses_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_json(json!({
            "query": "tax",
            "top_k": 10,
            "offset": 0,
            "limit": 10
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(1, 10, 0, true)))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .search(&SearchRequest {
            query: "tax".to_string(),
            top_k: 10,
            filters: None,
            offset: 0,
            limit: 10,
        })
        .await
        .unwrap();

    assert_eq!(response.results.len(), 10);
    assert_eq!(response.results[0].chunk_id(), "chunk-1");
    assert_eq!(response.total_found, 25);
    assert!(response.has_more);
}

#[tokio::test]
async fn search_controller_pages_tax_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "query": "tax", "offset": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(1, 10, 0, true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "query": "tax", "offset": 10 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(11, 10, 10, true)))
        .mount(&server)
        .await;

    let config = ClientConfig::with_base_url(server.uri());
    let mut controller = SearchController::new(GatewayClient::new(&config).unwrap(), &config);

    controller.search("tax", None, false).await;
    let outcome = controller.load_more().await;

    assert_eq!(outcome, Some(PageOutcome::Applied { received: 10 }));
    assert_eq!(controller.session().results().len(), 20);
    assert_eq!(controller.session().offset(), 20);
    assert_eq!(controller.session().results()[19].chunk_id(), "chunk-20");
}

#[tokio::test]
async fn search_error_detail_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "Search failed" })))
        .mount(&server)
        .await;

    let config = ClientConfig::with_base_url(server.uri());
    let mut controller = SearchController::new(GatewayClient::new(&config).unwrap(), &config);

    assert_eq!(
        controller.search("tax", None, false).await,
        Some(PageOutcome::Failed)
    );
    assert_eq!(
        controller.session().error(),
        Some("API error (500): Search failed")
    );
    assert!(controller.session().results().is_empty());
}

// =============================================================================
// Resources
// =============================================================================

#[tokio::test]
async fn resources_listing_uses_offset_and_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [{
                "resource_id": "res-1",
                "filename": "tax-guide.pdf",
                "num_chunks": 12,
                "uploaded_at": "2024-05-01T10:00:00.123456"
            }],
            "total": 1,
            "offset": 0,
            "limit": 20,
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::with_base_url(server.uri());
    let mut controller = ResourceController::new(GatewayClient::new(&config).unwrap(), &config);

    assert_eq!(controller.refresh().await, PageOutcome::Applied { received: 1 });
    let resource = &controller.session().results()[0];
    assert_eq!(resource.filename, "tax-guide.pdf");
    assert!(resource.uploaded_at_utc().is_some());
    assert!(controller.load_more().await.is_none());
}

#[tokio::test]
async fn resource_chunks_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources/res-1/chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "chunk_id": "c1", "text": "first", "page_number": 1 },
            { "chunk_id": "c2", "text": "second", "page_number": 2 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/resources/res-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Resource deleted",
            "resource_id": "res-1",
            "chunks_deleted": 2
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resources/missing/chunks"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "detail": "Resource not found" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);

    let chunks = client.resource_chunks("res-1").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].page_number, 2);

    let deleted = client.delete_resource("res-1").await.unwrap();
    assert_eq!(deleted.chunks_deleted, 2);

    let err = client.resource_chunks("missing").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Api { status: 404, ref message } if message == "Resource not found"
    ));
}

#[tokio::test]
async fn health_reports_services() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "services": { "vector_store": true, "llm": false },
            "index": { "total_chunks": 42 }
        })))
        .mount(&server)
        .await;

    let health = client_for(&server).health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.index.total_chunks, 42);
    assert!(!health.all_services_ready());
}

// =============================================================================
// Chat Stream
// =============================================================================

const SSE_BODY: &str = concat!(
    ": keep-alive\n\n",
    "event: sources\n",
    "data: {\"sources\":[{\"file_name\":\"tax-guide.pdf\",\"page_number\":4,\"text\":\"VAT is...\",\"score\":0.93}]}\n\n",
    "event: query\ndata: {\"rewritten_query\":\"value added tax definition\"}\n\n",
    "event: chunk\ndata: {\"text\":\"VAT is a \"}\n\n",
    "event: chunk\ndata: {\"text\":\"consumption tax.\"}\n\n",
    "event: done\ndata: {\"search_time_ms\": 120.5}\n\n",
);

#[tokio::test]
async fn chat_stream_fills_assistant_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .and(header("accept", "text/event-stream"))
        .and(body_json(json!({ "message": "What is VAT?", "history": [] })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = ChatSession::new(client_for(&server));
    let report = session.send_message("What is VAT?").await.unwrap();

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(report.diagnostics.frames_applied, 5);
    assert_eq!(report.diagnostics.dropped(), 0);

    let turn = session.conversation().turn(report.turn_id).unwrap();
    assert_eq!(turn.content, "VAT is a consumption tax.");
    assert_eq!(
        turn.rewritten_query.as_deref(),
        Some("value added tax definition")
    );
    assert_eq!(turn.sources.as_ref().unwrap()[0].page_number, 4);
    assert_eq!(turn.search_time_ms, Some(120.5));
    assert!(!turn.is_streaming);
}

#[tokio::test]
async fn chat_stream_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({ "detail": "Chat service not available" })),
        )
        .mount(&server)
        .await;

    let mut session = ChatSession::new(client_for(&server));
    let err = session.send_message("hello").await.unwrap_err();

    assert!(matches!(
        err,
        ChatError::Transport(ClientError::Api { status: 503, .. })
    ));
    assert_eq!(session.conversation().turns()[1].content, ERROR_FALLBACK_MESSAGE);
    assert!(!session.conversation().is_streaming());
}

#[tokio::test]
async fn chat_stream_empty_body_fails_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
        .mount(&server)
        .await;

    let mut session = ChatSession::new(client_for(&server));
    let err = session.send_message("hello").await.unwrap_err();

    assert!(matches!(err, ChatError::Transport(ClientError::MissingBody)));
}
