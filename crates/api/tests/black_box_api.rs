use printquota_infra::{AppConfig, DatabaseConfig};
use printquota_ledger::LedgerPolicy;
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(LedgerPolicy::default()).await
    }

    async fn spawn_with(policy: LedgerPolicy) -> Self {
        let config = AppConfig {
            database: DatabaseConfig::in_memory(),
            policy,
            ..AppConfig::default()
        };

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = printquota_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = reqwest::Client::new()
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = reqwest::get(self.url(path)).await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn credit_debit_query_lifecycle() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post(
            "/accounts/credit",
            json!({"id": "11111111-1", "display_name": "JUAN", "amount": 150}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], 150);
    assert_eq!(body["created"], true);
    assert!(body["message"].as_str().unwrap().contains("JUAN"));

    let (status, body) = srv
        .post("/accounts/debit", json!({"id": "11111111-1", "amount": "50"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], 100);

    let (status, body) = srv
        .post("/accounts/debit", json!({"id": "11111111-1", "amount": 101}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "insufficient_balance");

    let (status, body) = srv
        .post("/accounts/query", json!({"id": "11111111-1"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "11111111-1");
    assert_eq!(body["display_name"], "JUAN");
    assert_eq!(body["balance"], 100);

    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["kind"], "debit");
    assert_eq!(history[0]["amount"], 50);
    assert_eq!(history[1]["kind"], "credit");
    assert_eq!(history[1]["amount"], 150);
    assert!(history[0]["timestamp"].as_str().unwrap().ends_with('Z'));

    let (status, same) = srv.get("/accounts/11111111-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(same, body);
}

#[tokio::test]
async fn second_credit_updates_name_and_balance() {
    let srv = TestServer::spawn().await;

    srv.post(
        "/accounts/credit",
        json!({"id": "2-7", "display_name": "ANA", "amount": 10}),
    )
    .await;
    let (status, body) = srv
        .post(
            "/accounts/credit",
            json!({"id": "2-7", "display_name": "ANA MARIA", "amount": 5.0}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], 15);
    assert_eq!(body["created"], false);

    let (_, body) = srv.get("/accounts/2-7").await;
    assert_eq!(body["display_name"], "ANA MARIA");
}

#[tokio::test]
async fn missing_fields_and_invalid_input() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.post("/accounts/credit", json!({"id": "1-9"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_fields");

    let (status, body) = srv
        .post("/accounts/debit", json!({"id": "", "amount": 1}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_fields");

    let (status, body) = srv.post("/accounts/query", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_fields");

    for amount in [json!(0), json!(-5), json!(2.5), json!("many"), json!(true)] {
        let (status, body) = srv
            .post(
                "/accounts/credit",
                json!({"id": "1-9", "display_name": "ANA", "amount": amount}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");
    }

    // Rejected requests leave nothing behind.
    let (_, body) = srv.get("/accounts").await;
    assert!(body["accounts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_counts_as_missing_fields() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .post(srv.url("/accounts/debit"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_fields");
}

#[tokio::test]
async fn unknown_accounts_are_not_found() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post("/accounts/debit", json!({"id": "nope", "amount": 1}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = srv.post("/accounts/query", json!({"id": "nope"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv.get("/accounts/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_accounts_sorted_by_id() {
    let srv = TestServer::spawn().await;

    for (id, name, amount) in [("b", "BETA", 2), ("a", "ALFA", 1), ("c", "GAMMA", 3)] {
        srv.post(
            "/accounts/credit",
            json!({"id": id, "display_name": name, "amount": amount}),
        )
        .await;
    }

    let (status, body) = srv.get("/accounts").await;
    assert_eq!(status, StatusCode::OK);
    let accounts = body["accounts"].as_array().unwrap();
    let ids: Vec<&str> = accounts.iter().map(|a| a["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(accounts[0]["display_name"], "ALFA");
    assert_eq!(accounts[2]["balance"], 3);
}

#[tokio::test]
async fn route_names_are_valid_account_ids() {
    let srv = TestServer::spawn().await;

    for id in ["credit", "debit", "query"] {
        let (status, _) = srv
            .post(
                "/accounts/credit",
                json!({"id": id, "display_name": "SHOP", "amount": 4}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = srv.get(&format!("/accounts/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);
        assert_eq!(body["balance"], 4);
    }

    let (status, body) = srv.get("/accounts/debit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn route_name_lookup_of_unknown_account_is_not_found() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/accounts/query").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn collection_accepts_trailing_slash() {
    let srv = TestServer::spawn().await;
    srv.post(
        "/accounts/credit",
        json!({"id": "4-4", "display_name": "LUZ", "amount": 1}),
    )
    .await;

    let (status, body) = srv.get("/accounts/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accounts"].as_array().unwrap().len(), 1);

    let (status, body) = srv
        .post("/accounts/", json!({"id": "5-5", "display_name": "MAR"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], true);
}

#[tokio::test]
async fn strict_provisioning_flow() {
    let srv = TestServer::spawn_with(LedgerPolicy {
        opening_balance: 200,
        auto_create_accounts: false,
    })
    .await;

    let (status, body) = srv
        .post(
            "/accounts/credit",
            json!({"id": "3-3", "display_name": "PEDRO", "amount": 10}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = srv
        .post("/accounts", json!({"id": "3-3", "display_name": "PEDRO"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance"], 200);
    assert_eq!(body["created"], true);

    let (status, body) = srv
        .post("/accounts", json!({"id": "3-3", "display_name": "PEDRO"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);

    let (_, body) = srv.get("/accounts/3-3").await;
    assert_eq!(body["balance"], 200);
    assert!(body["history"].as_array().unwrap().is_empty());

    let (status, body) = srv
        .post("/accounts/debit", json!({"id": "3-3", "amount": 200}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], 0);
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, srv.url("/accounts/credit"))
        .header("origin", "https://print.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(res.status().is_success());
    assert_eq!(
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
