//! Typed schema of a financial-events page.
//!
//! Only the parts the harvester reads are modelled. Unknown event lists and
//! fields are ignored; anything the harvester does read must have the expected
//! shape or decoding fails with [`PayloadError`].

use crate::{errors::PayloadError, pagination::cursor::Cursor};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    payload: EventPage,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventPage {
    #[serde(default)]
    pub next_token: Option<String>,
    pub financial_events: FinancialEvents,
}

impl EventPage {
    /// Decodes a raw provider response body.
    pub fn decode(raw: &serde_json::Value) -> Result<Self, PayloadError> {
        if raw.get("payload").is_none() {
            return Err(PayloadError::MissingField("payload"));
        }
        Envelope::deserialize(raw)
            .map(|envelope| envelope.payload)
            .map_err(|e| PayloadError::Decode(e.to_string()))
    }

    /// Continuation cursor; an empty token counts as exhaustion.
    pub fn next_cursor(&self) -> Option<Cursor> {
        self.next_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(Cursor::from)
    }

    pub fn refunds(&self) -> &[RefundEvent] {
        self.financial_events.refund_event_list.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinancialEvents {
    #[serde(default)]
    pub refund_event_list: Option<Vec<RefundEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RefundEvent {
    #[serde(default, rename = "AmazonOrderId")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub shipment_item_adjustment_list: Option<Vec<ShipmentItem>>,
}

impl RefundEvent {
    pub fn items(&self) -> &[ShipmentItem] {
        self.shipment_item_adjustment_list.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShipmentItem {
    #[serde(default, rename = "SellerSKU")]
    pub seller_sku: Option<String>,
    #[serde(default)]
    pub item_charge_adjustment_list: Option<Vec<ChargeComponent>>,
}

impl ShipmentItem {
    pub fn charges(&self) -> &[ChargeComponent] {
        self.item_charge_adjustment_list.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChargeComponent {
    pub charge_type: String,
    pub charge_amount: Money,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Money {
    pub currency_code: String,
    pub currency_amount: RawAmount,
}

/// Amounts usually arrive as JSON numbers, occasionally as numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(serde_json::Number),
    Text(String),
}

impl RawAmount {
    fn as_text(&self) -> String {
        match self {
            RawAmount::Number(n) => n.to_string(),
            RawAmount::Text(s) => s.trim().to_string(),
        }
    }
}

impl ChargeComponent {
    /// Signed amount of this charge, parsed without going through floating point.
    pub fn signed_amount(&self) -> Result<Decimal, PayloadError> {
        let text = self.charge_amount.currency_amount.as_text();
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| PayloadError::InvalidAmount {
                charge_type: self.charge_type.clone(),
                value: text,
            })
    }
}
