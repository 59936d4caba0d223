//! PostgREST-backed remote store.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use super::realtime;
use super::{ChangeSubscription, RemoteStore, SyncError, SyncRecord, SyncResult};
use crate::auth::supabase::parse_api_error;
use crate::auth::AuthHandle;
use crate::config::BackendConfig;

const TABLE: &str = "sessions";

pub struct SupabaseRemoteStore {
    rest_url: String,
    realtime_url: String,
    anon_key: String,
    client: Client,
    auth: AuthHandle,
}

impl SupabaseRemoteStore {
    pub fn new(config: &BackendConfig, auth: AuthHandle) -> SyncResult<Self> {
        Ok(Self {
            rest_url: config.rest_url(),
            realtime_url: config.realtime_url(),
            anon_key: config.anon_key.clone(),
            client: Client::builder().build()?,
            auth,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{TABLE}", self.rest_url)
    }

    /// Adds the API key and the user's token so row-level security applies.
    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.auth.access_token().unwrap_or_else(|| self.anon_key.clone());
        request.header("apikey", &self.anon_key).bearer_auth(token)
    }

    async fn rows(response: Response) -> SyncResult<Vec<SyncRecord>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }
        Ok(response.json::<Vec<SyncRecord>>().await?)
    }

    async fn single(response: Response, fallback: &SyncRecord) -> SyncResult<SyncRecord> {
        let mut rows = Self::rows(response).await?;
        if rows.is_empty() {
            return Ok(fallback.clone());
        }
        Ok(rows.swap_remove(0))
    }
}

#[async_trait]
impl RemoteStore for SupabaseRemoteStore {
    async fn fetch(&self, user_id: &str, session_date: &str) -> SyncResult<Option<SyncRecord>> {
        let response = self
            .authed(self.client.get(self.table_url()))
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("session_date", format!("eq.{session_date}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows = Self::rows(response).await?;
        debug!(rows = rows.len(), "Fetched remote sessions");
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, record: &SyncRecord) -> SyncResult<SyncRecord> {
        let body = record.without_id();
        let response = self
            .authed(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        Self::single(response, &body).await
    }

    async fn update(&self, id: &str, record: &SyncRecord) -> SyncResult<SyncRecord> {
        let body = record.without_id();
        let response = self
            .authed(self.client.patch(self.table_url()))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let fallback = SyncRecord {
            id: Some(id.to_string()),
            ..body
        };
        Self::single(response, &fallback).await
    }

    fn subscribe(&self, user_id: &str) -> ChangeSubscription {
        realtime::spawn_listener(
            self.realtime_url.clone(),
            self.auth.clone(),
            user_id.to_string(),
        )
    }
}

impl fmt::Debug for SupabaseRemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseRemoteStore")
            .field("rest_url", &self.rest_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = BackendConfig::new("https://abc.supabase.co/", "anon").unwrap();
        let store = SupabaseRemoteStore::new(&config, AuthHandle::signed_out()).unwrap();
        assert_eq!(store.table_url(), "https://abc.supabase.co/rest/v1/sessions");
        assert!(store.realtime_url.starts_with("wss://abc.supabase.co/realtime/v1/websocket"));
    }

    #[test]
    fn test_debug_hides_key() {
        let config = BackendConfig::new("https://abc.supabase.co", "secret-anon").unwrap();
        let store = SupabaseRemoteStore::new(&config, AuthHandle::signed_out()).unwrap();
        assert!(!format!("{store:?}").contains("secret-anon"));
    }
}
