//! etcd v3 coordination backend.

use crate::coordinator::Coordinator;
use crate::types::{KeyValue, LeaseId, Revision};
use async_trait::async_trait;
use common::{Error, Result};
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, EventType, GetOptions, LeaseKeepAliveStream,
    LeaseKeeper, PutOptions, SortOrder, SortTarget, Txn, TxnOp, TxnOpResponse, WatchOptions,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace};

fn coordination(op: &str, e: etcd_client::Error) -> Error {
    Error::coordination(format!("etcd {} failed: {}", op, e))
}

fn convert(kv: &etcd_client::KeyValue) -> KeyValue {
    KeyValue {
        key: String::from_utf8_lossy(kv.key()).into_owned(),
        value: String::from_utf8_lossy(kv.value()).into_owned(),
        create_revision: kv.create_revision(),
        lease: kv.lease(),
    }
}

/// [`Coordinator`] backed by an etcd cluster.
pub struct EtcdCoordinator {
    client: Client,
    keepers: Mutex<HashMap<LeaseId, (LeaseKeeper, LeaseKeepAliveStream)>>,
}

impl EtcdCoordinator {
    /// Dial the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if no endpoint can be reached within the
    /// dial timeout or the TLS handshake fails.
    pub async fn connect(endpoints: &[String], options: ConnectOptions) -> Result<Self> {
        debug!(?endpoints, "Connecting to etcd");
        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(|e| Error::connection(format!("failed to connect to etcd: {}", e)))?;
        Ok(Self::from_client(client))
    }

    /// Wrap an already connected client.
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            keepers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Coordinator for EtcdCoordinator {
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId> {
        let ttl_secs = ttl.as_secs().max(1) as i64;
        let resp = self
            .client
            .clone()
            .lease_grant(ttl_secs, None)
            .await
            .map_err(|e| coordination("lease grant", e))?;
        debug!(lease = format_args!("{:x}", resp.id()), ttl = resp.ttl(), "Lease granted");
        Ok(resp.id())
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<Option<Duration>> {
        let mut keepers = self.keepers.lock().await;
        if !keepers.contains_key(&lease) {
            let stream = self
                .client
                .clone()
                .lease_keep_alive(lease)
                .await
                .map_err(|e| coordination("lease keep-alive", e))?;
            keepers.insert(lease, stream);
        }
        let Some((keeper, stream)) = keepers.get_mut(&lease) else {
            return Err(Error::coordination("keep-alive stream missing"));
        };

        let renewed = match keeper.keep_alive().await {
            Ok(()) => stream.message().await,
            Err(e) => Err(e),
        };

        match renewed {
            Ok(Some(resp)) if resp.ttl() > 0 => {
                trace!(lease = format_args!("{:x}", lease), ttl = resp.ttl(), "Lease renewed");
                Ok(Some(Duration::from_secs(resp.ttl() as u64)))
            }
            Ok(Some(_)) => {
                keepers.remove(&lease);
                Ok(None)
            }
            Ok(None) => {
                keepers.remove(&lease);
                Err(Error::coordination("keep-alive stream closed"))
            }
            Err(e) => {
                keepers.remove(&lease);
                Err(coordination("lease keep-alive", e))
            }
        }
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<()> {
        self.keepers.lock().await.remove(&lease);
        match self.client.clone().lease_revoke(lease).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("lease not found") => Ok(()),
            Err(e) => Err(coordination("lease revoke", e)),
        }
    }

    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> Result<(KeyValue, bool)> {
        let txn = Txn::new()
            .when(vec![Compare::create_revision(key, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(
                key,
                value,
                Some(PutOptions::new().with_lease(lease)),
            )])
            .or_else(vec![TxnOp::get(key, None)]);

        let resp = self
            .client
            .clone()
            .txn(txn)
            .await
            .map_err(|e| coordination("txn", e))?;

        if resp.succeeded() {
            let revision = resp.header().map(|h| h.revision()).unwrap_or_default();
            return Ok((
                KeyValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    create_revision: revision,
                    lease,
                },
                true,
            ));
        }

        for op in resp.op_responses() {
            if let TxnOpResponse::Get(get) = op {
                if let Some(kv) = get.kvs().first() {
                    return Ok((convert(kv), false));
                }
            }
        }
        Err(Error::coordination(format!(
            "key {} vanished during create",
            key
        )))
    }

    async fn latest_before(
        &self,
        prefix: &str,
        max_create_revision: Revision,
    ) -> Result<(Option<KeyValue>, Revision)> {
        let options = GetOptions::new()
            .with_prefix()
            .with_max_create_revision(max_create_revision)
            .with_sort(SortTarget::Create, SortOrder::Descend)
            .with_limit(1);

        let resp = self
            .client
            .clone()
            .get(prefix, Some(options))
            .await
            .map_err(|e| coordination("range", e))?;

        let revision = resp.header().map(|h| h.revision()).unwrap_or_default();
        Ok((resp.kvs().first().map(convert), revision))
    }

    async fn wait_deleted(&self, key: &str, since_revision: Revision) -> Result<()> {
        let options = WatchOptions::new().with_start_revision(since_revision);
        let (_watcher, mut stream) = self
            .client
            .clone()
            .watch(key, Some(options))
            .await
            .map_err(|e| coordination("watch", e))?;

        while let Some(resp) = stream
            .message()
            .await
            .map_err(|e| coordination("watch", e))?
        {
            if resp.canceled() {
                return Err(Error::coordination(format!("watch on {} canceled", key)));
            }
            if resp
                .events()
                .iter()
                .any(|event| event.event_type() == EventType::Delete)
            {
                return Ok(());
            }
        }

        Err(Error::coordination(format!("watch on {} closed", key)))
    }

    async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        let resp = self
            .client
            .clone()
            .get(key, None)
            .await
            .map_err(|e| coordination("get", e))?;
        Ok(resp.kvs().first().map(convert))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .clone()
            .delete(key, None)
            .await
            .map_err(|e| coordination("delete", e))?;
        Ok(())
    }
}
