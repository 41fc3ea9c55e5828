// Connection Manager - one shared backing-store connection per manager

use crate::domain::Namespace;
use crate::error::{AppError, Result};
use crate::port::{BackingStore, Connector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct ConnectionInner {
    store: Arc<dyn BackingStore>,
    namespace: Namespace,
    broken: AtomicBool,
}

/// Shared handle to an open backing-store connection
///
/// Clones are cheap and all refer to the same connection. Once closed or
/// once any operation reports a connectivity failure, every clone fails with
/// `AppError::Connectivity`. There is no automatic reconnect.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn new(store: Arc<dyn BackingStore>, namespace: Namespace) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                store,
                namespace,
                broken: AtomicBool::new(false),
            }),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    /// Namespaced store key for a logical name
    pub fn key(&self, name: &str) -> String {
        self.inner.namespace.key(name)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.broken.load(Ordering::SeqCst)
    }

    /// Store handle, or `Connectivity` if this connection is unusable
    pub(crate) fn store(&self) -> Result<&Arc<dyn BackingStore>> {
        if self.is_closed() {
            return Err(AppError::Connectivity(
                "connection is closed; establish a new one".to_string(),
            ));
        }
        Ok(&self.inner.store)
    }

    /// Pass a store result through, poisoning the connection on connectivity loss
    pub(crate) fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connectivity() && !self.inner.broken.swap(true, Ordering::SeqCst) {
                warn!(error = %e, "Connection lost; further operations will fail");
            }
        }
        result
    }

    /// Close the connection for every clone
    pub async fn close(&self) {
        if !self.inner.broken.swap(true, Ordering::SeqCst) {
            info!("Closing backing-store connection");
        }
        self.inner.store.close().await;
    }

    /// True if both handles share the same underlying connection
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("namespace", &self.inner.namespace)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Lazily opens and shares one connection
///
/// Explicitly constructed and passed around; there is no process-global
/// instance. Concurrent first callers wait on the same connect attempt.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    namespace: Namespace,
    current: Mutex<Option<Connection>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, namespace: Namespace) -> Self {
        Self {
            connector,
            namespace,
            current: Mutex::new(None),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Shared connection, opened on first use
    ///
    /// A closed or broken connection is returned as-is (its operations fail);
    /// call [`ConnectionManager::reconnect`] to replace it.
    ///
    /// # Errors
    /// - `AppError::Connectivity` if no connection exists and connecting fails
    pub async fn connection(&self) -> Result<Connection> {
        let mut current = self.current.lock().await;
        if let Some(conn) = current.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.open().await?;
        *current = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the current connection (if any) and open a fresh one
    pub async fn reconnect(&self) -> Result<Connection> {
        let mut current = self.current.lock().await;
        if let Some(old) = current.take() {
            old.close().await;
        }
        let conn = self.open().await?;
        *current = Some(conn.clone());
        Ok(conn)
    }

    /// Close and forget the current connection
    pub async fn close(&self) {
        if let Some(conn) = self.current.lock().await.take() {
            conn.close().await;
        }
    }

    async fn open(&self) -> Result<Connection> {
        let target = self.connector.describe();
        let store = self.connector.connect().await.map_err(|e| match e {
            AppError::Connectivity(_) => e,
            other => AppError::Connectivity(format!("connect to {} failed: {}", target, other)),
        })?;
        info!(target = %target, namespace = %self.namespace, "Connected to backing store");
        Ok(Connection::new(store, self.namespace.clone()))
    }
}
