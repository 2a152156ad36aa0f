// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Usage observation endpoint.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::model::{UsagePeriod, UsageStatApi};
use crate::transport::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct UsageQuery {
    pub period: Option<String>,
}

/// `GET /usage?period=daily|weekly|monthly`
pub async fn usage(
    State(s): State<Arc<AppState>>,
    Query(query): Query<UsageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let period = match query.period.as_deref() {
        None => UsagePeriod::Daily,
        Some(raw) => UsagePeriod::parse(raw)
            .ok_or_else(|| ApiError::validation(format!("unknown period {raw}")))?,
    };
    let stats = s.store.usage().find_by_period(period)?;
    Ok(Json(stats.into_iter().map(UsageStatApi::from).collect::<Vec<_>>()))
}
