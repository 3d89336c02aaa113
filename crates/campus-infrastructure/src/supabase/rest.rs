//! Table access through the backend's PostgREST endpoint.

use async_trait::async_trait;
use campus_core::gateway::{Filter, Query, TableGateway, render_value};
use campus_core::{CampusError, Result};
use reqwest::{Method, Response};
use serde_json::Value;

use super::{SupabaseGateway, failure_message, transport_error};

/// `col=eq.value` query pairs for every filter clause.
fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    filter
        .clauses()
        .iter()
        .map(|(column, value)| (column.clone(), format!("eq.{}", render_value(value))))
        .collect()
}

fn select_params(query: &Query) -> Vec<(String, String)> {
    let columns = query.columns.as_deref().unwrap_or("*");
    let mut params = vec![("select".to_string(), strip_whitespace(columns))];
    params.extend(filter_params(&query.filter));
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    params
}

/// PostgREST rejects spaces inside embedded selects such as `profiles(full_name, avatar_url)`.
fn strip_whitespace(columns: &str) -> String {
    columns.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Total row count from a `Content-Range` header such as `0-24/573` or `*/0`.
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

impl SupabaseGateway {
    async fn rest_request(
        &self,
        method: Method,
        table: &str,
        params: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, self.endpoint("rest", table))
            .query(params);
        self.authorized(request).await
    }
}

async fn ensure_read(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(CampusError::read(failure_message(response).await))
    }
}

async fn ensure_write(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(CampusError::write(failure_message(response).await))
    }
}

async fn rows_of(response: Response) -> Result<Vec<Value>> {
    response
        .json()
        .await
        .map_err(|e| CampusError::read(format!("unexpected table response: {}", e)))
}

#[async_trait]
impl TableGateway for SupabaseGateway {
    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let response = self
            .rest_request(Method::POST, table, &[])
            .await
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(transport_error)?;
        let rows = rows_of(ensure_write(response).await?).await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| CampusError::write(format!("insert into {} returned no row", table)))
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let response = self
            .rest_request(Method::GET, table, &select_params(query))
            .await
            .send()
            .await
            .map_err(transport_error)?;
        rows_of(ensure_read(response).await?).await
    }

    async fn select_one(&self, table: &str, filter: &Filter) -> Result<Option<Value>> {
        let query = Query::new().filter(filter.clone());
        let mut params = select_params(&query);
        params.push(("limit".to_string(), "2".to_string()));

        let response = self
            .rest_request(Method::GET, table, &params)
            .await
            .send()
            .await
            .map_err(transport_error)?;
        let mut rows = rows_of(ensure_read(response).await?).await?;

        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            _ => Err(CampusError::read(format!(
                "more than one {} row matches {}",
                table, filter
            ))),
        }
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()> {
        let response = self
            .rest_request(Method::PATCH, table, &filter_params(filter))
            .await
            .header("Prefer", "return=minimal")
            .json(&patch)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_write(response).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        let response = self
            .rest_request(Method::DELETE, table, &filter_params(filter))
            .await
            .send()
            .await
            .map_err(transport_error)?;
        ensure_write(response).await?;
        Ok(())
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filter));

        let response = self
            .rest_request(Method::HEAD, table, &params)
            .await
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_read(response).await?;

        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| CampusError::read(format!("count of {} returned no total", table)))
    }
}
