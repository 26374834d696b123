// src/filter.rs
//! In-process record predicate (`total > 1000`, `status == paid`). It runs
//! either on listing summaries, before any detail fetch, or on fetched detail.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::ProcessedItem;
use crate::error::SyncError;
use crate::remote::ListEntry;

/// Where the filter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// On listing summaries; detail is fetched only for matches.
    #[default]
    Listing,
    /// On fetched detail; every listed key is fetched first.
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    field: String,
    op: Op,
    value: String,
}

impl RecordFilter {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Items lacking the field never match.
    pub fn matches(&self, item: &ProcessedItem) -> bool {
        item.field(&self.field)
            .is_some_and(|v| self.matches_value(v))
    }

    /// Same test against a listing summary. Entries listed without a
    /// summary never match.
    pub fn matches_entry(&self, entry: &ListEntry) -> bool {
        entry
            .field(&self.field)
            .is_some_and(|v| self.matches_value(v))
    }

    fn matches_value(&self, actual: &Value) -> bool {
        let actual_num = match actual {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        };
        if let (Some(a), Ok(b)) = (actual_num, self.value.parse::<f64>()) {
            return match self.op {
                Op::Gt => a > b,
                Op::Ge => a >= b,
                Op::Lt => a < b,
                Op::Le => a <= b,
                Op::Eq => a == b,
                Op::Ne => a != b,
            };
        }

        let actual_str = match actual {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.op {
            Op::Eq => actual_str == self.value,
            Op::Ne => actual_str != self.value,
            // ordering on non-numbers is lexical
            Op::Gt => actual_str.as_str() > self.value.as_str(),
            Op::Ge => actual_str.as_str() >= self.value.as_str(),
            Op::Lt => actual_str.as_str() < self.value.as_str(),
            Op::Le => actual_str.as_str() <= self.value.as_str(),
        }
    }
}

impl FromStr for RecordFilter {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RE: OnceCell<Regex> = OnceCell::new();
        let re = RE.get_or_init(|| {
            Regex::new(r#"^\s*([A-Za-z_][\w.]*)\s*(>=|<=|==|!=|>|<)\s*"?([^"]*?)"?\s*$"#)
                .expect("static filter regex")
        });
        let caps = re
            .captures(s)
            .ok_or_else(|| SyncError::Config(format!("unparseable filter `{s}`")))?;
        let op = match &caps[2] {
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "<" => Op::Lt,
            "<=" => Op::Le,
            "==" => Op::Eq,
            _ => Op::Ne,
        };
        let value = caps[3].to_string();
        if value.is_empty() {
            return Err(SyncError::Config(format!("filter `{s}` has no value")));
        }
        Ok(Self::new(&caps[1], op, value))
    }
}

impl fmt::Display for RecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Eq => "==",
            Op::Ne => "!=",
        };
        write!(f, "{} {} {}", self.field, op, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ResourceRecord;
    use serde_json::json;

    fn item(v: Value) -> ProcessedItem {
        ProcessedItem {
            id: "o1".into(),
            details: vec![ResourceRecord::json("orders/o1", v)],
        }
    }

    #[test]
    fn parses_numeric_threshold() {
        let f: RecordFilter = "total > 1000".parse().unwrap();
        assert_eq!(f, RecordFilter::new("total", Op::Gt, "1000"));
        assert!(f.matches(&item(json!({"total": 1500}))));
        assert!(!f.matches(&item(json!({"total": 1000}))));
        assert!(!f.matches(&item(json!({"status": "paid"}))));
    }

    #[test]
    fn string_equality_and_quotes() {
        let f: RecordFilter = r#"status == "paid""#.parse().unwrap();
        assert!(f.matches(&item(json!({"status": "paid"}))));
        assert!(!f.matches(&item(json!({"status": "open"}))));
        let ne: RecordFilter = "meta.plan != free".parse().unwrap();
        assert!(ne.matches(&item(json!({"meta": {"plan": "pro"}}))));
    }

    #[test]
    fn numeric_strings_compare_as_numbers() {
        let f: RecordFilter = "bytes >= 10".parse().unwrap();
        assert!(f.matches(&item(json!({"bytes": "12"}))));
    }

    #[test]
    fn listing_summaries_are_tested_the_same_way() {
        let f: RecordFilter = "total > 1000".parse().unwrap();
        assert!(f.matches_entry(&ListEntry::new("3").with_summary(json!({"total": 1150}))));
        assert!(!f.matches_entry(&ListEntry::new("4").with_summary(json!({"total": 160}))));
        assert!(!f.matches_entry(&ListEntry::new("5")));
    }

    #[test]
    fn rejects_garbage() {
        assert!("total >".parse::<RecordFilter>().is_err());
        assert!("> 5".parse::<RecordFilter>().is_err());
        assert!("total ~ 5".parse::<RecordFilter>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let f: RecordFilter = "total<=5".parse().unwrap();
        assert_eq!(f.to_string(), "total <= 5");
    }
}
