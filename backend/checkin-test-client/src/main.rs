// src/main.rs

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;

// Only the envelope fields are checked here; payloads are printed raw.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: Option<bool>,
    success: Option<bool>,
    code: Option<String>,
    msg: Option<String>,
}

impl Envelope {
    fn is_ok(&self) -> bool {
        self.ok.or(self.success).unwrap_or(false)
    }
}

async fn call(
    client: &Client,
    api_url: &str,
    action: &str,
    token: &str,
) -> Result<(Envelope, Value), Box<dyn Error>> {
    let response = client
        .get(api_url)
        .query(&[("action", action), ("token", token)])
        .send()
        .await?;

    println!("{} -> HTTP {}", action, response.status());
    let body: Value = response.json().await?;
    let envelope: Envelope = serde_json::from_value(body.clone())?;
    Ok((envelope, body))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let api_url = std::env::var("CHECKIN_API_URL")
        .map_err(|_| "CHECKIN_API_URL must point at the backend endpoint")?;
    let client = Client::new();

    // Test 1: endpoint reachable
    println!("\n🔍 Testing backend endpoint...");
    let (envelope, body) = call(&client, &api_url, "testEndpoint", "").await?;
    println!("testEndpoint ok={} body={}", envelope.is_ok(), body);

    // Test 2: login URL
    println!("\n🔍 Requesting login URL...");
    let (envelope, body) = call(&client, &api_url, "getLoginUrl", "").await?;
    match body.get("url").and_then(Value::as_str) {
        Some(url) => println!("Login URL: {}", url),
        None => println!(
            "No login URL returned (code={:?}, msg={:?})",
            envelope.code, envelope.msg
        ),
    }

    let token = prompt_for_token()?;

    if !token.is_empty() {
        // Test 3: session validity
        println!("\n🔍 Testing checkSession with token...");
        let (envelope, _) = call(&client, &api_url, "checkSession", &token).await?;
        println!("Session valid: {}", envelope.is_ok());

        // Test 4: initApp payload
        println!("\n🔍 Testing initApp with token...");
        let (envelope, body) = call(&client, &api_url, "initApp", &token).await?;
        if envelope.is_ok() {
            println!("User: {}", body.get("user").cloned().unwrap_or(Value::Null));
            let abnormal = body
                .get("abnormalRecords")
                .and_then(Value::as_array)
                .map(|records| records.len())
                .unwrap_or(0);
            println!("Abnormal records: {}", abnormal);
        } else {
            println!(
                "initApp failed: code={:?}, msg={:?}",
                envelope.code, envelope.msg
            );
        }
    }

    println!("\n✅ Testing complete!");

    Ok(())
}

fn prompt_for_token() -> Result<String, Box<dyn Error>> {
    println!("Enter session token (press Enter to skip token-based tests):");
    let mut token = String::new();
    std::io::stdin().read_line(&mut token)?;
    Ok(token.trim().to_string())
}
