//! Money - 正の金額
//!
//! pledge 金額は常に正の decimal です。`Amount` を作れた時点で
//! 「0 以下」「数値でない」はありえないので、ストア層は検証しません。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// InvalidAmount は金額の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidAmount {
    #[error("amount is not a number: {0}")]
    NotNumeric(String),

    #[error("amount must be greater than zero, got {0}")]
    NotPositive(Decimal),
}

/// A strictly positive decimal amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, InvalidAmount> {
        if value > Decimal::ZERO {
            Ok(Self(value.normalize()))
        } else {
            Err(InvalidAmount::NotPositive(value))
        }
    }

    /// JSON の number または数値文字列から作成
    ///
    /// `1e2` のような指数表記も受け付けます。
    pub fn from_json(value: &serde_json::Value) -> Result<Self, InvalidAmount> {
        match value {
            serde_json::Value::Number(n) => Self::parse(&n.to_string()),
            serde_json::Value::String(s) => Self::parse(s),
            other => Err(InvalidAmount::NotNumeric(other.to_string())),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidAmount> {
        let trimmed = raw.trim();
        let value = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| InvalidAmount::NotNumeric(raw.to_string()))?;
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Amount::new(value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
