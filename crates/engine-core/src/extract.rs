//! Refund amounts contained in one page of financial events.

use model::{
    core::scope::Scope,
    errors::PayloadError,
    events::{EventPage, ShipmentItem},
};
use rust_decimal::Decimal;
use tracing::warn;

/// Charge type carrying the refunded item price.
pub const PRINCIPAL_CHARGE: &str = "Principal";

/// Magnitude of one qualifying charge adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAmount {
    pub amount: Decimal,
    pub currency: String,
    pub item: Option<String>,
}

/// Decodes a raw page body and extracts its qualifying amounts.
pub fn extract_page(
    raw: &serde_json::Value,
    scope: &Scope,
) -> Result<(EventPage, Vec<ExtractedAmount>), PayloadError> {
    let page = EventPage::decode(raw)?;
    let amounts = extract(&page, scope)?;
    Ok((page, amounts))
}

/// Only `Principal` adjustments of refund events count, as absolute values.
/// Other event lists and charge types (fees, taxes, promotions) are ignored.
pub fn extract(page: &EventPage, scope: &Scope) -> Result<Vec<ExtractedAmount>, PayloadError> {
    let mut amounts = Vec::new();

    for item in page
        .refunds()
        .iter()
        .flat_map(|refund| refund.items())
        .filter(|item| in_scope(item, scope))
    {
        for charge in item
            .charges()
            .iter()
            .filter(|charge| charge.charge_type == PRINCIPAL_CHARGE)
        {
            amounts.push(ExtractedAmount {
                amount: charge.signed_amount()?.abs(),
                currency: charge.charge_amount.currency_code.clone(),
                item: item.seller_sku.clone(),
            });
        }
    }

    Ok(amounts)
}

fn in_scope(item: &ShipmentItem, scope: &Scope) -> bool {
    match scope.as_key() {
        None => true,
        Some(key) => item.seller_sku.as_deref() == Some(key),
    }
}

/// Remembers the first currency of a harvest and flags any other one.
#[derive(Debug, Default)]
pub struct CurrencyTracker {
    first: Option<String>,
}

impl CurrencyTracker {
    /// Returns `false` (and warns) when `currency` differs from the first one seen.
    pub fn observe(&mut self, currency: &str) -> bool {
        match &self.first {
            None => {
                self.first = Some(currency.to_string());
                true
            }
            Some(first) if first == currency => true,
            Some(first) => {
                warn!(
                    expected = %first,
                    found = %currency,
                    "Refund amount in unexpected currency, summing anyway"
                );
                false
            }
        }
    }
}
