#![allow(dead_code)]

use connectors::{
    auth::{Credentials, OAuthTokenProvider},
    source::http::{DEFAULT_EVENTS_PATH, HttpEventSource},
    store::{CheckpointStore, PeriodTotalStore, sled_store::SledStore},
};
use engine_config::settings::{HarvestSettings, RateLimitSettings};
use engine_core::harvest::Harvester;
use mockito::{Matcher, Mock, ServerGuard};
use reqwest::Client;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;

pub const TOKEN_PATH: &str = "/auth/o2/token";
pub const SKU: &str = "SKU-123";

/// Test window `[2025-11-01T00:00:00Z, 2025-11-30T23:59:59Z)` as sent on the wire.
pub const POSTED_AFTER: &str = "2025-11-01T00:00:00Z";
pub const POSTED_BEFORE: &str = "2025-11-30T23:59:59Z";

/// No pacing and short backoff so scenarios run in real time.
pub fn fast_settings() -> HarvestSettings {
    HarvestSettings {
        page_interval: Duration::ZERO,
        rate_limit: RateLimitSettings {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        ..HarvestSettings::default()
    }
}

/// Response body of one events page with a single Principal refund of `amount`.
pub fn refund_page(sku: &str, amount: &str, next_token: Option<&str>) -> String {
    let mut payload = json!({
        "FinancialEvents": {
            "RefundEventList": [ {
                "AmazonOrderId": "111-0000000-0000000",
                "ShipmentItemAdjustmentList": [ {
                    "SellerSKU": sku,
                    "ItemChargeAdjustmentList": [
                        {
                            "ChargeType": "Principal",
                            "ChargeAmount": { "CurrencyCode": "USD", "CurrencyAmount": amount.parse::<f64>().unwrap() }
                        },
                        {
                            "ChargeType": "Tax",
                            "ChargeAmount": { "CurrencyCode": "USD", "CurrencyAmount": -0.8 }
                        }
                    ]
                } ]
            } ],
            "ShipmentEventList": []
        }
    });
    if let Some(token) = next_token {
        payload["NextToken"] = json!(token);
    }
    json!({ "payload": payload }).to_string()
}

pub async fn mock_token(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", TOKEN_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"Atza|test","token_type":"bearer","expires_in":3600}"#)
        .create_async()
        .await
}

/// Mocks `count` pages of one `-10.00` refund each, chained through `page-N`
/// cursors. Later pages are registered first: among matching mocks the first
/// one still missing hits answers, and page 1 matches every request.
pub async fn mock_pages(server: &mut ServerGuard, count: usize) -> Vec<Mock> {
    let mut mocks = Vec::with_capacity(count);
    for index in (1..count).rev() {
        let next = (index + 1 < count).then(|| format!("page-{}", index + 1));
        let mock = server
            .mock("GET", DEFAULT_EVENTS_PATH)
            .match_header("authorization", "Bearer Atza|test")
            .match_query(Matcher::UrlEncoded(
                "NextToken".into(),
                format!("page-{index}"),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(refund_page(SKU, "-10.00", next.as_deref()))
            .expect(1)
            .create_async()
            .await;
        mocks.push(mock);
    }
    mocks
}

pub async fn mock_first_page(server: &mut ServerGuard, count: usize) -> Mock {
    let next = (count > 1).then(|| "page-1".to_string());
    server
        .mock("GET", DEFAULT_EVENTS_PATH)
        .match_header("authorization", "Bearer Atza|test")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("PostedAfter".into(), POSTED_AFTER.into()),
            Matcher::UrlEncoded("PostedBefore".into(), POSTED_BEFORE.into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(refund_page(SKU, "-10.00", next.as_deref()))
        .expect(1)
        .create_async()
        .await
}

pub fn credentials() -> Credentials {
    Credentials {
        client_id: "client-1".into(),
        client_secret: "secret-1".into(),
        refresh_token: "refresh-1".into(),
    }
}

/// Sled-backed store in a temporary directory that lives as long as the value.
pub struct TempStore {
    pub store: Arc<SledStore>,
    _dir: TempDir,
}

impl TempStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SledStore::open(dir.path().join("state")).expect("open sled store");
        Self {
            store: Arc::new(store),
            _dir: dir,
        }
    }
}

/// Harvester wired to the mock server the way the binary wires production.
pub fn harvester<S>(server_url: &str, store: Arc<S>, settings: HarvestSettings) -> Harvester
where
    S: CheckpointStore + PeriodTotalStore + 'static,
{
    let client = Client::new();
    let tokens = OAuthTokenProvider::new(
        client.clone(),
        format!("{server_url}{TOKEN_PATH}"),
        credentials(),
    );
    let source = HttpEventSource::new(client, server_url).with_page_size(100);

    Harvester::new(Arc::new(tokens), Arc::new(source), store.clone(), settings)
        .with_period_totals(store)
}

pub fn parse(body: &str) -> Value {
    serde_json::from_str(body).expect("valid json")
}
