// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only usage stats. Observed side output, not part of the core
//! lifecycle; rows are upserted per (date, period) bucket.

use chrono::Datelike;
use rusqlite::{params, Row};

use super::Store;
use crate::error::Result;
use crate::id;
use crate::model::{UsagePeriod, UsageStat};

pub struct UsageRepo<'a> {
    pub(super) store: &'a Store,
}

/// Increments applied to a (date, period) bucket.
#[derive(Debug, Clone, Default)]
pub struct UsageDelta {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub request_count: i64,
    pub error_count: i64,
}

const COLUMNS: &str =
    "date, period, input_tokens, output_tokens, total_tokens, request_count, error_count, models";

fn from_row(row: &Row<'_>) -> rusqlite::Result<UsageStat> {
    let period: String = row.get("period")?;
    let models: String = row.get("models")?;
    Ok(UsageStat {
        date: row.get("date")?,
        period: UsagePeriod::parse(&period).unwrap_or(UsagePeriod::Daily),
        input_tokens: row.get("input_tokens")?,
        output_tokens: row.get("output_tokens")?,
        total_tokens: row.get("total_tokens")?,
        request_count: row.get("request_count")?,
        error_count: row.get("error_count")?,
        models: serde_json::from_str(&models).unwrap_or_else(|_| serde_json::json!({})),
    })
}

impl UsageRepo<'_> {
    /// Fold a delta into today's bucket for the given period.
    pub fn record(&self, period: UsagePeriod, delta: &UsageDelta) -> Result<UsageStat> {
        let date = bucket_date(period);
        self.store.with_tx(|tx| {
            tx.execute(
                "INSERT INTO usage_stats
                     (date, period, input_tokens, output_tokens, total_tokens,
                      request_count, error_count)
                 VALUES (?1, ?2, ?3, ?4, ?3 + ?4, ?5, ?6)
                 ON CONFLICT (date, period) DO UPDATE SET
                     input_tokens = input_tokens + excluded.input_tokens,
                     output_tokens = output_tokens + excluded.output_tokens,
                     total_tokens = total_tokens + excluded.total_tokens,
                     request_count = request_count + excluded.request_count,
                     error_count = error_count + excluded.error_count",
                params![
                    date,
                    period.as_str(),
                    delta.input_tokens,
                    delta.output_tokens,
                    delta.request_count,
                    delta.error_count
                ],
            )?;
            tx.query_row(
                &format!("SELECT {COLUMNS} FROM usage_stats WHERE date = ?1 AND period = ?2"),
                params![date, period.as_str()],
                from_row,
            )
            .map_err(Into::into)
        })
    }

    pub fn find_by_period(&self, period: UsagePeriod) -> Result<Vec<UsageStat>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM usage_stats WHERE period = ?1 ORDER BY date DESC"
            ))?;
            let rows = stmt.query_map(params![period.as_str()], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }
}

/// The bucket key for "today" under a period: the day itself, the Monday of
/// the week, or the first of the month.
fn bucket_date(period: UsagePeriod) -> String {
    let today = id::now_iso();
    let day = today.split('T').next().unwrap_or("").to_owned();
    match period {
        UsagePeriod::Daily => day,
        UsagePeriod::Weekly => {
            let date = chrono::NaiveDate::parse_from_str(&day, "%Y-%m-%d").unwrap_or_default();
            let monday = date
                - chrono::Days::new(date.weekday().num_days_from_monday() as u64);
            monday.format("%Y-%m-%d").to_string()
        }
        UsagePeriod::Monthly => format!("{}-01", &day[..7.min(day.len())]),
    }
}
