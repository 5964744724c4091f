//! Cloud Datastore v1 REST backend.
//!
//! Talks to `https://datastore.googleapis.com` or, when pointed at it, the
//! Datastore emulator. Every call is a `POST {base}/v1/projects/{project}:{method}`
//! with a JSON body.
//!
//! # Authentication
//!
//! A static OAuth2 bearer token can be attached with
//! [`HttpDatastore::with_access_token`]. The emulator needs none.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use super::api::{DatastoreApi, MoreResults, Mutation, Query, QueryBatch, TransactionId};
use super::error::{DatastoreError, DatastoreResult};
use super::key::{Key, PartitionId};
use super::value::Entity;

/// Datastore backend speaking the REST API.
#[derive(Debug, Clone)]
pub struct HttpDatastore {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    access_token: Option<String>,
}

impl HttpDatastore {
    /// Creates a backend for `project_id` rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        request_timeout: Duration,
    ) -> DatastoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            access_token: None,
        })
    }

    /// Sends `token` as a bearer token on every request.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1/projects/{}:{}",
            self.base_url, self.project_id, method
        )
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> DatastoreResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(self.endpoint(method))
            .header("Accept", "application/json")
            .json(body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(method, error = %e, "Datastore request failed");
            DatastoreError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = error_from_body(status.as_u16(), &body);
            tracing::debug!(method, error = %err, "Datastore returned an error");
            return Err(err);
        }

        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl DatastoreApi for HttpDatastore {
    async fn begin_transaction(&self) -> DatastoreResult<TransactionId> {
        let response: BeginTransactionResponse = self
            .call(
                "beginTransaction",
                &BeginTransactionRequest {
                    transaction_options: TransactionOptions {
                        read_write: ReadWrite {},
                    },
                },
            )
            .await?;
        Ok(TransactionId(response.transaction))
    }

    async fn lookup(
        &self,
        keys: &[Key],
        transaction: Option<&TransactionId>,
    ) -> DatastoreResult<Vec<Entity>> {
        let read_options = transaction.map(|tx| ReadOptions {
            transaction: tx.0.clone(),
        });

        let mut found = Vec::with_capacity(keys.len());
        let mut pending = keys.to_vec();

        // The service may defer part of a large lookup; ask again for those.
        while !pending.is_empty() {
            let response: LookupResponse = self
                .call(
                    "lookup",
                    &LookupRequest {
                        read_options: read_options.clone(),
                        keys: &pending,
                    },
                )
                .await?;

            found.extend(response.found.into_iter().map(|result| result.entity));
            pending = response.deferred;
        }

        Ok(found)
    }

    async fn commit(
        &self,
        mutations: Vec<Mutation>,
        transaction: Option<&TransactionId>,
    ) -> DatastoreResult<()> {
        let request = CommitRequest {
            mode: if transaction.is_some() {
                "TRANSACTIONAL"
            } else {
                "NON_TRANSACTIONAL"
            },
            transaction: transaction.map(|tx| tx.0.as_str()),
            mutations,
        };
        let _: IgnoredAny = self.call("commit", &request).await?;
        Ok(())
    }

    async fn rollback(&self, transaction: &TransactionId) -> DatastoreResult<()> {
        let _: IgnoredAny = self
            .call(
                "rollback",
                &RollbackRequest {
                    transaction: &transaction.0,
                },
            )
            .await?;
        Ok(())
    }

    async fn run_query(&self, query: &Query) -> DatastoreResult<QueryBatch> {
        let request = RunQueryRequest {
            partition_id: &query.partition,
            query: KindQuery {
                kind: vec![KindExpression { name: &query.kind }],
                start_cursor: query.start_cursor.as_deref(),
            },
        };
        let response: RunQueryResponse = self.call("runQuery", &request).await?;

        Ok(QueryBatch {
            entities: response
                .batch
                .entity_results
                .into_iter()
                .map(|result| result.entity)
                .collect(),
            end_cursor: response.batch.end_cursor,
            more_results: response.batch.more_results,
        })
    }
}

/// Maps an error response onto [`DatastoreError`].
fn error_from_body(code: u16, body: &str) -> DatastoreError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.status == "ABORTED" => {
            DatastoreError::Aborted(envelope.error.message)
        }
        Ok(envelope) => DatastoreError::Status {
            code,
            status: envelope.error.status,
            message: envelope.error.message,
        },
        Err(_) => DatastoreError::Status {
            code,
            status: String::new(),
            message: body.to_string(),
        },
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BeginTransactionRequest {
    transaction_options: TransactionOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionOptions {
    read_write: ReadWrite,
}

#[derive(Serialize)]
struct ReadWrite {}

#[derive(Deserialize)]
struct BeginTransactionResponse {
    transaction: String,
}

#[derive(Clone, Serialize)]
struct ReadOptions {
    transaction: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    read_options: Option<ReadOptions>,
    keys: &'a [Key],
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    found: Vec<EntityResult>,
    #[serde(default)]
    deferred: Vec<Key>,
}

#[derive(Deserialize)]
struct EntityResult {
    entity: Entity,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction: Option<&'a str>,
    mutations: Vec<Mutation>,
}

#[derive(Serialize)]
struct RollbackRequest<'a> {
    transaction: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest<'a> {
    partition_id: &'a PartitionId,
    query: KindQuery<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KindQuery<'a> {
    kind: Vec<KindExpression<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<&'a str>,
}

#[derive(Serialize)]
struct KindExpression<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct RunQueryResponse {
    batch: QueryResultBatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultBatch {
    #[serde(default)]
    entity_results: Vec<EntityResult>,
    #[serde(default)]
    end_cursor: Option<String>,
    more_results: MoreResults,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let api = HttpDatastore::new("http://localhost:8081/", "demo", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            api.endpoint("lookup"),
            "http://localhost:8081/v1/projects/demo:lookup"
        );
    }

    #[test]
    fn test_error_from_body() {
        let aborted = error_from_body(
            409,
            r#"{"error":{"code":409,"message":"too much contention","status":"ABORTED"}}"#,
        );
        assert!(aborted.is_conflict());

        match error_from_body(
            400,
            r#"{"error":{"code":400,"message":"bad key","status":"INVALID_ARGUMENT"}}"#,
        ) {
            DatastoreError::Status {
                code,
                status,
                message,
            } => {
                assert_eq!(code, 400);
                assert_eq!(status, "INVALID_ARGUMENT");
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error {other:?}"),
        }

        match error_from_body(502, "upstream unavailable") {
            DatastoreError::Status { code, message, .. } => {
                assert_eq!(code, 502);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_commit_request_shape() {
        let key = Key::new(PartitionId::new("demo"), "Client", "a");
        let request = CommitRequest {
            mode: "TRANSACTIONAL",
            transaction: Some("tx1"),
            mutations: vec![Mutation::Delete(key)],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["mode"], "TRANSACTIONAL");
        assert_eq!(json["transaction"], "tx1");
        assert_eq!(json["mutations"][0]["delete"]["path"][0]["name"], "a");
    }
}
