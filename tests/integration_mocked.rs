//! Provider and engine behavior against mocked HTTP upstreams.
//!
//! The log store is built on a lazy pool pointing at nothing: log writes
//! fail and are swallowed, which is exactly the contract under test. No
//! database is required here.

use lead_enrichment_api::config::{Config, DEFAULT_MQL_THRESHOLD, DEFAULT_SQL_THRESHOLD};
use lead_enrichment_api::enrichment_log::{EnrichmentLogStore, LogContext};
use lead_enrichment_api::errors::AppError;
use lead_enrichment_api::models::{Classification, EnrichmentInput, Urgency};
use lead_enrichment_api::providers::{LlmClient, SearchClient};
use lead_enrichment_api::scoring::{GatherResults, ScoringEngine};
use lead_enrichment_api::tools::{CompetitiveAnalysis, IntelFocus, Tools, ToolOutcome};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_uri: &str) -> Config {
    Config {
        database_url: "postgres://localhost:1/nowhere".to_string(),
        port: 0,
        search_base_url: format!("{}/exa", base_uri),
        search_api_key: "test-search-key".to_string(),
        crawl_base_url: format!("{}/fc", base_uri),
        crawl_api_key: "test-crawl-key".to_string(),
        llm_base_url: format!("{}/llm", base_uri),
        llm_api_key: "test-llm-key".to_string(),
        llm_model: "gpt-4o".to_string(),
        research_base_url: format!("{}/pplx", base_uri),
        research_api_key: "test-research-key".to_string(),
        research_model: "sonar-pro".to_string(),
        request_timeout_secs: 5,
        synthesis_max_retries: 1,
        worker_concurrency: 2,
        sql_threshold: DEFAULT_SQL_THRESHOLD,
        mql_threshold: DEFAULT_MQL_THRESHOLD,
    }
}

fn sink_log_store() -> EnrichmentLogStore {
    // Lazy pool: no connection is attempted until a query runs, and every
    // query fails fast against the closed port.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost:1/nowhere")
        .expect("lazy pool");
    EnrichmentLogStore::new(pool)
}

fn sample_input() -> EnrichmentInput {
    EnrichmentInput {
        contact_name: "Jane Smith".to_string(),
        company_email: "jane@acme-corp.io".to_string(),
        contact_phone: None,
        company_website: "https://acme-corp.io".to_string(),
        country: "US".to_string(),
        company_size: "51-200".to_string(),
        product_interest: "Analytics Platform".to_string(),
        how_can_we_help: "Need vendor consolidation this quarter".to_string(),
        behavioral_data: None,
        lead_id: None,
        company_id: None,
    }
}

fn intent_content() -> String {
    json!({
        "urgency": "high",
        "budget_mentioned": true,
        "buying_stage": "decision",
        "pain_points": ["tool sprawl"],
        "timeline": "this quarter",
        "decision_makers": true,
        "keywords": ["consolidation"],
        "sentiment": "positive",
        "intent_score": 82.0,
        "reasoning": "Clear timeline and budget."
    })
    .to_string()
}

fn chat_response(content: String, tokens: u64) -> serde_json::Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "total_tokens": tokens }
    })
}

#[tokio::test]
async fn search_client_parses_documents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exa/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {
                    "title": "Acme raises Series B",
                    "url": "https://news.example/acme-b",
                    "text": "Acme Corp announced a $40M Series B...",
                    "publishedDate": "2026-07-01T00:00:00Z",
                    "score": 0.91
                }
            ]
        })))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let client = SearchClient::new(&config);
    let documents = client
        .search_recent("Acme Corp funding", 5, 90)
        .await
        .unwrap();

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].title.as_deref(), Some("Acme raises Series B"));
    assert_eq!(documents[0].score, Some(0.91));
}

#[tokio::test]
async fn llm_client_returns_parsed_json_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_response(json!({"answer": 42}).to_string(), 357)),
        )
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let client = LlmClient::new(&config);
    let (value, tokens) = client.generate_json("system", "prompt").await.unwrap();

    assert_eq!(value["answer"], 42);
    assert_eq!(tokens, 357);
}

#[tokio::test]
async fn provider_error_degrades_tool_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exa/search"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let tools = Tools::new(&config, sink_log_store());
    let ctx = LogContext::new(Uuid::new_v4());

    let outcome = tools
        .company_intelligence(&ctx, "Acme Corp", IntelFocus::General)
        .await;
    assert!(outcome.is_degraded());
}

#[tokio::test]
async fn hung_provider_times_out_and_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exa/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "results": [] }))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.request_timeout_secs = 1;

    let client = SearchClient::new(&config);
    let err = client
        .search_recent("Acme Corp funding", 5, 90)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ProviderTimeout(_)));

    // At the tool level a timeout degrades the outcome like any other
    // provider failure.
    let tools = Tools::new(&config, sink_log_store());
    let ctx = LogContext::new(Uuid::new_v4());
    let outcome = tools
        .company_intelligence(&ctx, "Acme Corp", IntelFocus::General)
        .await;
    assert!(outcome.is_degraded());
}

#[tokio::test]
async fn intent_falls_back_when_provider_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let tools = Tools::new(&config, sink_log_store());
    let ctx = LogContext::new(Uuid::new_v4());

    let outcome = tools
        .intent_analysis(&ctx, "This is urgent, decision this quarter", None)
        .await;

    let signals = outcome.data().expect("fallback still yields signals");
    assert!(signals.fallback);
    assert_eq!(signals.urgency, Urgency::High);
    assert!((signals.intent_score - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn gather_yields_four_outcomes_despite_partial_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/exa/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;
    // The crawl provider is down for this run.
    Mock::given(method("POST"))
        .and(path("/fc/v1/crawl"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/llm/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_response(intent_content(), 412)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pplx/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(
            "Main competitors are Beta Inc and Gamma Ltd.".to_string(),
            180,
        )))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let engine = ScoringEngine::new(&config, sink_log_store());
    let ctx = LogContext::new(Uuid::new_v4());

    let results = engine.gather(&ctx, &sample_input()).await;

    assert_eq!(results.degraded_count(), 1);
    assert!(results.website.is_degraded());
    assert!(!results.news.is_degraded());
    assert!(!results.competitive.is_degraded());
    let intent = results.intent.data().expect("intent present");
    assert_eq!(intent.urgency, Urgency::High);
    assert!(!intent.fallback);
}

#[tokio::test]
async fn company_signals_are_reused_across_gathers_for_same_domain() {
    let server = MockServer::start().await;

    // Company-level tools must be hit exactly once; the second gather for
    // the same domain serves them from cache. The intent tool is
    // per-submission and runs both times.
    Mock::given(method("POST"))
        .and(path("/exa/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fc/v1/crawl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "markdown": "About Acme Corp", "metadata": { "sourceURL": "https://acme-corp.io/about" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pplx/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(
            "Main competitors are Beta Inc and Gamma Ltd.".to_string(),
            180,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/llm/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_response(intent_content(), 412)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let engine = ScoringEngine::new(&config, sink_log_store());
    let ctx = LogContext::new(Uuid::new_v4());

    let first = engine.gather(&ctx, &sample_input()).await;
    assert_eq!(first.degraded_count(), 0);

    let second = engine.gather(&ctx, &sample_input()).await;
    assert_eq!(second.degraded_count(), 0);
    assert!(!second.website.is_degraded());
}

#[tokio::test]
async fn synthesis_recomputes_overall_from_weights() {
    let server = MockServer::start().await;

    // The model reports a wrong overall and classification; the engine must
    // trust only the category scores.
    let synthesis_content = json!({
        "company": {
            "name": "Acme Corp",
            "industry": "Software",
            "employee_count": 120,
            "revenue": null,
            "location": "Austin, TX",
            "enriched_data": { "funding": "Series B" }
        },
        "intent_analysis": serde_json::from_str::<serde_json::Value>(&intent_content()).unwrap(),
        "scoring": {
            "firmographic_score": 75.0,
            "behavioral_score": 60.0,
            "intent_score": 70.0,
            "technographic_score": 60.0,
            "overall_score": 95.0,
            "classification": "SQL",
            "classification_confidence": 0.8,
            "reasoning": {
                "firmographic": "Mid-market software company.",
                "behavioral": "Moderate engagement.",
                "intent": "Strong timeline.",
                "technographic": "Compatible stack.",
                "overall": "Solid but not top-tier."
            }
        }
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/llm/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_response(synthesis_content, 960)),
        )
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let engine = ScoringEngine::new(&config, sink_log_store());
    let ctx = LogContext::new(Uuid::new_v4());

    let gathered = GatherResults {
        news: ToolOutcome::ok(vec![]),
        website: ToolOutcome::degraded("crawl unavailable"),
        competitive: ToolOutcome::ok(CompetitiveAnalysis {
            analysis: "Competes with Beta Inc.".to_string(),
        }),
        intent: ToolOutcome::ok(
            serde_json::from_str(&intent_content()).expect("intent signals parse"),
        ),
    };

    let outcome = engine
        .synthesize(&ctx, &sample_input(), &gathered)
        .await
        .unwrap();

    // 75*0.35 + 60*0.25 + 70*0.25 + 60*0.15 = 68.75, which is MQL territory
    // despite the model claiming 95/SQL.
    assert!((outcome.scoring.overall_score - 68.75).abs() < 1e-9);
    assert_eq!(outcome.scoring.classification, Classification::Mql);
    // Gathered intent signals override the model's restatement.
    assert_eq!(outcome.intent_analysis.urgency, Urgency::High);
}

#[tokio::test]
async fn synthesis_failure_is_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/v1/chat/completions"))
        // One call from the intent tool (which falls back), then the initial
        // synthesis attempt plus one retry (synthesis_max_retries = 1).
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let engine = ScoringEngine::new(&config, sink_log_store());
    let ctx = LogContext::new(Uuid::new_v4());

    let result = engine.enrich(&ctx, &sample_input()).await;
    assert!(result.is_err());
}
