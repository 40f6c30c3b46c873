use chrono::NaiveDate;
use serde::Serialize;

use super::money::Money;

/// Date layout of the ledger import file.
pub const LEDGER_DATE_FORMAT: &str = "%m/%d/%y";

/// A bank transaction normalized for the ledger import.
///
/// Built once per source record and never modified afterwards. The signed
/// amount is split on construction: a negative amount populates `outflow`, a
/// positive one `inflow`, and zero leaves both empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalTransaction {
    date: NaiveDate,
    payee: String,
    memo: String,
    category: String,
    outflow: Option<Money>,
    inflow: Option<Money>,
}

impl CanonicalTransaction {
    pub fn new(date: NaiveDate, payee: String, memo: String, amount: Money) -> Self {
        let (outflow, inflow) = if amount.is_negative() {
            (Some(amount.abs()), None)
        } else if amount.is_positive() {
            (None, Some(amount))
        } else {
            (None, None)
        };

        CanonicalTransaction {
            date,
            payee,
            memo,
            // Category assignment is left to the ledger application.
            category: String::new(),
            outflow,
            inflow,
        }
    }

    pub fn payee(&self) -> &str {
        &self.payee
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn outflow(&self) -> Option<Money> {
        self.outflow
    }

    pub fn inflow(&self) -> Option<Money> {
        self.inflow
    }

    /// Signed amount reconstructed from the outflow/inflow split.
    pub fn amount(&self) -> Money {
        match (self.outflow, self.inflow) {
            (Some(out), _) => -out,
            (None, Some(inflow)) => inflow,
            (None, None) => Money::zero(),
        }
    }

    pub fn formatted_date(&self) -> String {
        self.date.format(LEDGER_DATE_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(amount: &str) -> CanonicalTransaction {
        CanonicalTransaction::new(
            date(2024, 1, 15),
            "Payee".to_string(),
            "memo".to_string(),
            amount.parse().unwrap(),
        )
    }

    #[test]
    fn negative_amount_is_outflow() {
        let t = tx("-49.99");
        assert_eq!(t.outflow(), Some("49.99".parse().unwrap()));
        assert_eq!(t.inflow(), None);
    }

    #[test]
    fn positive_amount_is_inflow() {
        let t = tx("1500.00");
        assert_eq!(t.inflow(), Some("1500.00".parse().unwrap()));
        assert_eq!(t.outflow(), None);
    }

    #[test]
    fn zero_amount_leaves_both_empty() {
        let t = tx("0.00");
        assert_eq!(t.outflow(), None);
        assert_eq!(t.inflow(), None);
    }

    #[test]
    fn split_round_trips_signed_amount() {
        for raw in ["-0.01", "12.3", "-1000", "0"] {
            let amount: Money = raw.parse().unwrap();
            assert_eq!(tx(raw).amount(), amount, "amount {raw}");
        }
    }

    #[test]
    fn category_is_always_empty() {
        assert_eq!(tx("5").category(), "");
    }

    #[test]
    fn formatted_date_uses_two_digit_year() {
        assert_eq!(tx("5").formatted_date(), "01/15/24");
        let t = CanonicalTransaction::new(date(1999, 12, 3), String::new(), String::new(), Money::zero());
        assert_eq!(t.formatted_date(), "12/03/99");
    }

    #[test]
    fn serializes_amounts_as_options() {
        let json = serde_json::to_value(tx("-2.50")).unwrap();
        assert_eq!(json["payee"], "Payee");
        assert!(json["inflow"].is_null());
        assert!(!json["outflow"].is_null());
    }
}
