use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer};
use tallyfeed_core::{CanonicalTransaction, Money};
use thiserror::Error;

use crate::adapter::SourceAdapter;
use crate::resolver::{CandidateSources, PayeeResolver};
use crate::util::collapse_whitespace;

/// Vendor tag marking sub-categories in the feed, e.g. `micro-groceries`.
const SUB_CATEGORY_TAG: &str = "micro-";

/// One transaction as delivered by the smart-banking JSON feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    /// Booking time in epoch milliseconds.
    #[serde(rename = "visibleTS")]
    pub visible_ts: i64,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub partner_name: Option<String>,
    #[serde(default)]
    pub reference_text: Option<String>,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: Money,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub merchant_city: Option<String>,
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Invalid feed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses a feed response body: a JSON array of transaction records.
pub fn parse_records(json: &str) -> Result<Vec<FeedRecord>, FeedError> {
    Ok(serde_json::from_str(json)?)
}

/// JSON numbers are read through their shortest decimal text so `-12.3`
/// stays exactly `-12.3`.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Money, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(serde_json::Number),
        Text(String),
    }

    let text = match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => n.to_string(),
        RawAmount::Text(s) => s,
    };
    text.parse().map_err(serde::de::Error::custom)
}

pub struct FeedAdapter<'a> {
    resolver: &'a PayeeResolver,
}

impl<'a> FeedAdapter<'a> {
    pub fn new(resolver: &'a PayeeResolver) -> Self {
        Self { resolver }
    }
}

impl SourceAdapter for FeedAdapter<'_> {
    type Raw = FeedRecord;

    fn normalize(&self, raw: &FeedRecord) -> CanonicalTransaction {
        let merchant = raw
            .merchant_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(raw.partner_name.as_deref())
            .unwrap_or_default()
            .trim();
        let reference = raw.reference_text.as_deref().unwrap_or_default().trim();
        let category = raw
            .category
            .as_deref()
            .unwrap_or_default()
            .replace(SUB_CATEGORY_TAG, "");
        let category = category.trim();
        let city = raw.merchant_city.as_deref().unwrap_or_default().trim();

        let sources = CandidateSources::from_parts(
            merchant,
            [reference.to_string(), category.to_string()],
        );
        let payee = self.resolver.resolve(&sources);
        let memo = collapse_whitespace([merchant, reference, city]);

        CanonicalTransaction::new(booking_date(raw.visible_ts), payee, memo, raw.amount)
    }
}

/// UTC calendar date of an epoch-millisecond timestamp.
fn booking_date(millis: i64) -> NaiveDate {
    match DateTime::from_timestamp_millis(millis) {
        Some(ts) => ts.date_naive(),
        None => {
            tracing::warn!(millis, "timestamp out of range, using the epoch date");
            DateTime::UNIX_EPOCH.date_naive()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Rule, RuleEntry, RuleSet, RuleStore};

    fn resolver(entries: Vec<RuleEntry>) -> PayeeResolver {
        PayeeResolver::with_tracing(RuleStore::build(Some(RuleSet::new(entries)), None).unwrap())
    }

    fn lit(label: &str, prefix: &str) -> RuleEntry {
        RuleEntry::new(label, Rule::Literal(prefix.to_string()))
    }

    const SAMPLE_FEED: &str = r#"[
        {
            "id": "a1",
            "visibleTS": 1705312800000,
            "merchantName": "  REWE Markt GmbH ",
            "partnerName": "ignored",
            "referenceText": "Einkauf\n 1234",
            "amount": -23.45,
            "category": "micro-food-groceries",
            "merchantCity": "Berlin"
        },
        {
            "visibleTS": 1706745600000,
            "partnerName": "ACME Payroll",
            "referenceText": "Salary January",
            "amount": 2500,
            "category": "micro-income"
        },
        {
            "visibleTS": 1706745600000,
            "merchantName": "",
            "amount": "0.00"
        }
    ]"#;

    #[test]
    fn parse_records_reads_optional_fields() {
        let records = parse_records(SAMPLE_FEED).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].visible_ts, 1_705_312_800_000);
        assert_eq!(records[0].amount, "-23.45".parse().unwrap());
        assert_eq!(records[1].merchant_name, None);
        assert_eq!(records[2].amount, Money::zero());
        assert_eq!(records[2].reference_text, None);
    }

    #[test]
    fn parse_records_keeps_float_amount_exact() {
        let records =
            parse_records(r#"[{"visibleTS": 0, "amount": -12.3}, {"visibleTS": 0, "amount": 0.1}]"#).unwrap();
        assert_eq!(records[0].amount.to_string(), "-12.3");
        assert_eq!(records[1].amount.to_string(), "0.1");
    }

    #[test]
    fn parse_records_rejects_bad_amount() {
        assert!(parse_records(r#"[{"visibleTS": 0, "amount": "twelve"}]"#).is_err());
        assert!(parse_records(r#"[{"visibleTS": 0}]"#).is_err());
    }

    #[test]
    fn normalize_groceries_outflow() {
        let r = resolver(vec![lit("REWE", "rewe")]);
        let records = parse_records(SAMPLE_FEED).unwrap();
        let tx = FeedAdapter::new(&r).normalize(&records[0]);

        assert_eq!(tx.formatted_date(), "01/15/24");
        assert_eq!(tx.payee(), "REWE");
        assert_eq!(tx.memo(), "REWE Markt GmbH Einkauf 1234 Berlin");
        assert_eq!(tx.category(), "");
        assert_eq!(tx.outflow(), Some("23.45".parse().unwrap()));
        assert_eq!(tx.inflow(), None);
    }

    #[test]
    fn partner_name_used_when_no_merchant() {
        let r = resolver(vec![]);
        let records = parse_records(SAMPLE_FEED).unwrap();
        let tx = FeedAdapter::new(&r).normalize(&records[1]);

        assert_eq!(tx.payee(), "ACME Payroll");
        assert_eq!(tx.memo(), "ACME Payroll Salary January");
        assert_eq!(tx.inflow(), Some("2500".parse().unwrap()));
        assert_eq!(tx.formatted_date(), "02/01/24");
    }

    #[test]
    fn category_without_tag_is_a_candidate() {
        let r = resolver(vec![lit("Salary", "income")]);
        let records = parse_records(SAMPLE_FEED).unwrap();
        let tx = FeedAdapter::new(&r).normalize(&records[1]);
        assert_eq!(tx.payee(), "Salary");
        // Category output stays empty even though the category matched.
        assert_eq!(tx.category(), "");
    }

    #[test]
    fn record_without_texts_has_empty_payee_and_no_amount() {
        let r = resolver(vec![lit("REWE", "rewe")]);
        let records = parse_records(SAMPLE_FEED).unwrap();
        let tx = FeedAdapter::new(&r).normalize(&records[2]);
        assert_eq!(tx.payee(), "");
        assert_eq!(tx.memo(), "");
        assert_eq!(tx.outflow(), None);
        assert_eq!(tx.inflow(), None);
    }

    #[test]
    fn normalize_all_keeps_order() {
        let r = resolver(vec![]);
        let records = parse_records(SAMPLE_FEED).unwrap();
        let txs = FeedAdapter::new(&r).normalize_all(&records);
        let payees: Vec<_> = txs.iter().map(|t| t.payee()).collect();
        assert_eq!(payees, ["REWE Markt GmbH", "ACME Payroll", ""]);
    }

    #[test]
    fn booking_date_is_utc() {
        // 2024-01-15T23:30:00Z stays on the 15th regardless of local zone.
        assert_eq!(booking_date(1_705_361_400_000), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(booking_date(i64::MAX), NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }
}
