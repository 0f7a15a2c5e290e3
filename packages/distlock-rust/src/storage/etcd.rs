//! Production [`StorageAdapter`] backed by a real etcd cluster.
//!
//! Grounded on the pack's etcd-backed lock/KV adapters: transactional
//! compare-and-swap via `etcd_client::Txn`, `Compare::create_revision` to
//! express "absent", `Compare::value` to express "equals this payload".

use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, Txn, TxnOp, TxnOpResponse};
use tokio::sync::Mutex;

use crate::error::StorageError;

use super::{CasOutcome, CasValue, StorageAdapter};

/// `StorageAdapter` over an `etcd_client::Client`.
///
/// `etcd_client::Client` needs `&mut self` to issue a transaction in this
/// client version, so access is serialized behind a `Mutex` the same way
/// the pack's etcd-backed lock implementation wraps its client.
pub struct EtcdAdapter {
    client: Mutex<Client>,
}

impl EtcdAdapter {
    /// Wraps an already-connected etcd client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    /// Connects to the given endpoints and wraps the resulting client.
    ///
    /// # Errors
    /// Returns [`StorageError::Retryable`] if the initial connection fails --
    /// callers typically want to retry connection setup the same way the
    /// availability wrapper retries individual operations.
    pub async fn connect(endpoints: Vec<String>) -> Result<Self, StorageError> {
        let client = Client::connect(endpoints, None)
            .await
            .map_err(|e| StorageError::Retryable(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Classifies an etcd client error as retryable or not.
    ///
    /// `etcd_client::Error`'s variant set mixes connection-level failures
    /// (transport, I/O) with application-level gRPC statuses; rather than
    /// pattern-match a taxonomy that varies across client versions, this
    /// keys off the rendered message for the well-known transient failure
    /// modes (unavailable, deadline exceeded, connection reset) and treats
    /// everything else as non-retryable.
    fn classify(err: etcd_client::Error) -> StorageError {
        let message = err.to_string();
        let lower = message.to_lowercase();
        let transient = ["unavailable", "deadline exceeded", "connection reset", "transport error", "broken pipe"]
            .iter()
            .any(|marker| lower.contains(marker));
        if transient {
            StorageError::Retryable(message)
        } else {
            StorageError::Other(anyhow::anyhow!(message))
        }
    }
}

#[async_trait]
impl StorageAdapter for EtcdAdapter {
    async fn get(&self, key: &str) -> Result<CasValue, StorageError> {
        let mut client = self.client.lock().await;
        let resp = client
            .get(key.to_string(), None)
            .await
            .map_err(Self::classify)?;
        match resp.kvs().first() {
            Some(kv) => Ok(CasValue::Present(
                String::from_utf8_lossy(kv.value()).into_owned(),
            )),
            None => Ok(CasValue::Absent),
        }
    }

    async fn put_if(
        &self,
        key: &str,
        value: &str,
        witness: &CasValue,
        return_new_on_fail: bool,
    ) -> Result<CasOutcome, StorageError> {
        let key = key.to_string();
        let compare = match witness {
            CasValue::Absent => Compare::create_revision(key.clone(), CompareOp::Equal, 0),
            CasValue::Present(v) => Compare::value(key.clone(), CompareOp::Equal, v.as_bytes()),
        };
        let else_ops = if return_new_on_fail {
            vec![TxnOp::get(key.clone(), None)]
        } else {
            vec![]
        };
        let txn = Txn::new()
            .when([compare])
            .and_then([TxnOp::put(key, value.as_bytes(), None)])
            .or_else(else_ops);

        let mut client = self.client.lock().await;
        let resp = client.txn(txn).await.map_err(Self::classify)?;
        if resp.succeeded() {
            return Ok(CasOutcome::Applied);
        }
        Ok(CasOutcome::Conflict(extract_current(
            resp.op_responses(),
            return_new_on_fail,
        )))
    }

    async fn delete_if(
        &self,
        key: &str,
        witness: &CasValue,
        return_new_on_fail: bool,
    ) -> Result<CasOutcome, StorageError> {
        let key = key.to_string();
        let compare = match witness {
            CasValue::Absent => Compare::create_revision(key.clone(), CompareOp::Equal, 0),
            CasValue::Present(v) => Compare::value(key.clone(), CompareOp::Equal, v.as_bytes()),
        };
        let else_ops = if return_new_on_fail {
            vec![TxnOp::get(key.clone(), None)]
        } else {
            vec![]
        };
        let txn = Txn::new()
            .when([compare])
            .and_then([TxnOp::delete(key, None)])
            .or_else(else_ops);

        let mut client = self.client.lock().await;
        let resp = client.txn(txn).await.map_err(Self::classify)?;
        if resp.succeeded() {
            return Ok(CasOutcome::Applied);
        }
        Ok(CasOutcome::Conflict(extract_current(
            resp.op_responses(),
            return_new_on_fail,
        )))
    }
}

/// Pulls the current value out of a failed transaction's `or_else` branch.
fn extract_current(op_responses: Vec<TxnOpResponse>, return_new_on_fail: bool) -> Option<CasValue> {
    if !return_new_on_fail {
        return None;
    }
    op_responses.into_iter().find_map(|op| match op {
        TxnOpResponse::Get(get_resp) => Some(match get_resp.kvs().first() {
            Some(kv) => CasValue::Present(String::from_utf8_lossy(kv.value()).into_owned()),
            None => CasValue::Absent,
        }),
        _ => None,
    })
}
