mod common;

use std::net::SocketAddr;

use anyhow::Result;
use common::{seed_admin, test_service, ADMIN_EMAIL, TEST_PASSWORD};
use microloan::api::{build_router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct RawResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Value,
}

impl RawResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

async fn spawn_server() -> Result<(SocketAddr, TempDir)> {
    let (service, temp) = test_service().await?;
    seed_admin(&service).await?;

    let app = build_router(AppState::new(service));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    Ok((addr, temp))
}

async fn send_raw(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> RawResponse {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(token) = token {
        req.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    let body = body.unwrap_or("");
    if !body.is_empty() {
        req.push_str("Content-Type: application/json\r\n");
    }
    req.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");

    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let body = serde_json::from_str(body).unwrap_or(Value::Null);

    RawResponse {
        status,
        headers,
        body,
    }
}

async fn signup(addr: SocketAddr, name: &str, email: &str) -> String {
    let payload = json!({
        "name": name,
        "email": email,
        "password": TEST_PASSWORD,
        "phone": "9876543210",
    })
    .to_string();
    let resp = send_raw(addr, "POST", "/api/auth/signup", None, Some(&payload)).await;
    assert_eq!(resp.status, 201, "signup failed: {}", resp.body);
    resp.body["token"].as_str().expect("token").to_string()
}

async fn admin_token(addr: SocketAddr) -> String {
    let payload = json!({ "email": ADMIN_EMAIL, "password": TEST_PASSWORD }).to_string();
    let resp = send_raw(addr, "POST", "/api/auth/login", None, Some(&payload)).await;
    assert_eq!(resp.status, 200);
    resp.body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn test_healthz_echoes_request_id() -> Result<()> {
    let (addr, _temp) = spawn_server().await?;

    let resp = send_raw(addr, "GET", "/healthz", None, None).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body["status"], "ok");
    let request_id = resp.header("x-request-id").expect("request id header");
    assert!(!request_id.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_signup_login_and_profile() -> Result<()> {
    let (addr, _temp) = spawn_server().await?;
    let token = signup(addr, "Asha Rao", "asha@example.com").await;

    let profile = send_raw(addr, "GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(profile.status, 200);
    assert_eq!(profile.body["success"], true);
    assert_eq!(profile.body["user"]["email"], "asha@example.com");
    assert!(profile.body["user"].get("passwordHash").is_none());

    let update = json!({ "name": "Asha R.", "pan": "abcde1234f" }).to_string();
    let updated = send_raw(addr, "PUT", "/api/auth/profile", Some(&token), Some(&update)).await;
    assert_eq!(updated.status, 200);
    assert_eq!(updated.body["user"]["name"], "Asha R.");
    assert_eq!(updated.body["user"]["pan"], "ABCDE1234F");

    let anonymous = send_raw(addr, "GET", "/api/auth/profile", None, None).await;
    assert_eq!(anonymous.status, 401);
    assert_eq!(anonymous.body["success"], false);

    let forged = send_raw(addr, "GET", "/api/auth/profile", Some("v1.nope"), None).await;
    assert_eq!(forged.status, 401);

    let duplicate = json!({
        "name": "Asha",
        "email": "ASHA@example.com",
        "password": TEST_PASSWORD,
        "phone": "9876543210",
    })
    .to_string();
    let resp = send_raw(addr, "POST", "/api/auth/signup", None, Some(&duplicate)).await;
    assert_eq!(resp.status, 409);

    let bad_login = json!({ "email": "asha@example.com", "password": "Wr0ng!pass" }).to_string();
    let resp = send_raw(addr, "POST", "/api/auth/login", None, Some(&bad_login)).await;
    assert_eq!(resp.status, 401);
    assert_eq!(resp.body["message"], "Invalid credentials");

    Ok(())
}

#[tokio::test]
async fn test_quote_accepts_form_strings() -> Result<()> {
    let (addr, _temp) = spawn_server().await?;

    let payload = json!({ "amount": "50000", "duration": "12", "purpose": "Medical" }).to_string();
    let resp = send_raw(addr, "POST", "/api/loans/quote", None, Some(&payload)).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body["purpose"], "medical");
    assert_eq!(resp.body["quote"]["monthlyPayment"], 4489);
    assert_eq!(resp.body["quote"]["totalPayment"], 53868);
    assert_eq!(resp.body["quote"]["totalInterest"], 3868);

    let zero_term = json!({ "amount": 50000, "termMonths": 0 }).to_string();
    let resp = send_raw(addr, "POST", "/api/loans/quote", None, Some(&zero_term)).await;
    assert_eq!(resp.status, 400);

    let huge_term = json!({ "amount": 50000, "termMonths": 4294967295_u64 }).to_string();
    let resp = send_raw(addr, "POST", "/api/loans/quote", None, Some(&huge_term)).await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body["success"], false);

    let too_large = json!({ "amount": "600000", "duration": "12" }).to_string();
    let resp = send_raw(addr, "POST", "/api/loans/quote", None, Some(&too_large)).await;
    assert_eq!(resp.status, 400);

    let rates = send_raw(addr, "GET", "/api/loans/rates", None, None).await;
    assert_eq!(rates.status, 200);
    assert_eq!(rates.body["rates"].as_array().map(Vec::len), Some(7));
    assert_eq!(rates.body["limits"]["maxAmount"], 500000);

    Ok(())
}

#[tokio::test]
async fn test_apply_ignores_client_emi() -> Result<()> {
    let (addr, _temp) = spawn_server().await?;
    let asha = signup(addr, "Asha", "asha@example.com").await;
    let ravi = signup(addr, "Ravi", "ravi@example.com").await;

    let payload =
        json!({ "amount": 50000, "termMonths": 12, "purpose": "Medical", "emi": 1 }).to_string();
    let resp = send_raw(addr, "POST", "/api/loans/apply", Some(&asha), Some(&payload)).await;
    assert_eq!(resp.status, 201);
    assert_eq!(resp.body["loan"]["status"], "pending");
    assert_eq!(resp.body["loan"]["quote"]["monthlyPayment"], 4489);
    let loan_id = resp.body["loan"]["id"].as_str().expect("loan id").to_string();

    let mine = send_raw(addr, "GET", "/api/loans/my-loans", Some(&asha), None).await;
    assert_eq!(mine.status, 200);
    assert_eq!(mine.body["loans"].as_array().map(Vec::len), Some(1));

    let path = format!("/api/loans/{loan_id}");
    let own = send_raw(addr, "GET", &path, Some(&asha), None).await;
    assert_eq!(own.status, 200);
    let foreign = send_raw(addr, "GET", &path, Some(&ravi), None).await;
    assert_eq!(foreign.status, 404);

    let out_of_range = json!({ "amount": 1000, "termMonths": 12, "purpose": "Business" }).to_string();
    let resp = send_raw(addr, "POST", "/api/loans/apply", Some(&asha), Some(&out_of_range)).await;
    assert_eq!(resp.status, 400);

    let anonymous = send_raw(addr, "POST", "/api/loans/apply", None, Some(&payload)).await;
    assert_eq!(anonymous.status, 401);

    Ok(())
}

#[tokio::test]
async fn test_admin_review_flow() -> Result<()> {
    let (addr, _temp) = spawn_server().await?;
    let asha = signup(addr, "Asha", "asha@example.com").await;
    let admin = admin_token(addr).await;

    let payload = json!({ "amount": 100000, "termMonths": 6, "purpose": "Business" }).to_string();
    let resp = send_raw(addr, "POST", "/api/loans/apply", Some(&asha), Some(&payload)).await;
    let loan_id = resp.body["loan"]["id"].as_str().expect("loan id").to_string();
    let status_path = format!("/api/admin/loans/{loan_id}/status");

    let forbidden = send_raw(addr, "GET", "/api/admin/loans", Some(&asha), None).await;
    assert_eq!(forbidden.status, 403);

    let approve = json!({ "status": "approved" }).to_string();
    let resp = send_raw(addr, "PUT", &status_path, Some(&asha), Some(&approve)).await;
    assert_eq!(resp.status, 403);

    let bogus = json!({ "status": "cancelled" }).to_string();
    let resp = send_raw(addr, "PUT", &status_path, Some(&admin), Some(&bogus)).await;
    assert_eq!(resp.status, 400);

    let resp = send_raw(addr, "PUT", &status_path, Some(&admin), Some(&approve)).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body["loan"]["status"], "approved");

    let pending = send_raw(addr, "GET", "/api/admin/loans?status=pending", Some(&admin), None).await;
    assert_eq!(pending.body["loans"].as_array().map(Vec::len), Some(0));
    let all = send_raw(addr, "GET", "/api/admin/loans", Some(&admin), None).await;
    assert_eq!(all.body["loans"].as_array().map(Vec::len), Some(1));

    let audit_path = format!("/api/admin/audit?loan_id={loan_id}");
    let audit = send_raw(addr, "GET", &audit_path, Some(&admin), None).await;
    assert_eq!(audit.status, 200);
    assert_eq!(audit.body["entries"][0]["action"], "APPROVE_LOAN");

    let stats = send_raw(addr, "GET", "/api/admin/stats", Some(&admin), None).await;
    assert_eq!(stats.status, 200);
    assert_eq!(stats.body["stats"]["approvedLoans"], 1);
    assert_eq!(stats.body["stats"]["approvalRate"], 100.0);
    assert_eq!(stats.body["stats"]["totalUsers"], 1);

    let users = send_raw(addr, "GET", "/api/admin/users", Some(&admin), None).await;
    assert_eq!(users.body["users"].as_array().map(Vec::len), Some(1));

    let missing = format!("/api/admin/loans/{}/status", uuid::Uuid::new_v4());
    let resp = send_raw(addr, "PUT", &missing, Some(&admin), Some(&approve)).await;
    assert_eq!(resp.status, 404);

    Ok(())
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() -> Result<()> {
    let (addr, _temp) = spawn_server().await?;

    let resp = send_raw(addr, "POST", "/api/auth/login", None, Some("{not json")).await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body["success"], false);

    Ok(())
}
