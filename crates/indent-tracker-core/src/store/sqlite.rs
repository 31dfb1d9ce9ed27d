//! SQLite-backed document store.
//!
//! Every write commits the document and one `changes` row in a single
//! transaction. Subscriptions read an initial snapshot together with the
//! commit-log cursor, then tail `changes` in `seq` order, so each subscriber
//! sees every committed state of its path in commit order. Writers in this
//! process wake subscribers through a head-sequence watch channel; writes
//! from other processes sharing the file are found by polling.
//!
//! The log keeps only the most recent [`StoreConfig::retained_changes`] rows.
//! A subscriber whose cursor falls behind the oldest retained row reloads
//! its whole scope and continues from there.
//!
//! All SQLite work runs on Tokio's blocking pool; a busy database file never
//! stalls the async workers.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tokio::sync::watch;

use super::{
    CollectionPath, CollectionSnapshot, DocPath, DocumentSnapshot, Record, RemoteStore,
    StoreError, StoreResult, StoredDocument, Subscription, SCHEMA,
};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "pharmacy-tracker-v2";

/// Commit-log rows kept when none is configured.
pub const DEFAULT_RETAINED_CHANGES: u32 = 10_000;

/// Rows fetched per commit-log read.
const CHANGE_BATCH: i64 = 256;

/// Store construction parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file; `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Isolates deployments sharing one database file.
    pub namespace: String,
    /// How often subscribers check for writes from other processes.
    pub poll_interval: Duration,
    /// Newest commit-log rows kept across all namespaces; zero behaves as one.
    pub retained_changes: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            poll_interval: Duration::from_millis(500),
            retained_changes: DEFAULT_RETAINED_CHANGES,
        }
    }
}

impl StoreConfig {
    pub fn in_memory(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn at_path(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// Document store over one SQLite connection. Clones share the connection.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Mutex<Connection>,
    namespace: String,
    poll_interval: Duration,
    retained_changes: i64,
    /// Highest committed `seq` written through this handle.
    head: watch::Sender<i64>,
}

impl Inner {
    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// What a subscription watches.
#[derive(Debug, Clone)]
enum Scope {
    Collection(CollectionPath),
    Document(DocPath),
}

impl Scope {
    fn collection(&self) -> &str {
        match self {
            Scope::Collection(c) => c.as_str(),
            Scope::Document(d) => d.collection().as_str(),
        }
    }
}

/// One row of the commit log.
struct ChangeRow {
    seq: i64,
    doc_id: String,
    body: Option<Record>,
}

/// Scope contents paired with the log cursor they are current at.
struct ScopeState {
    cursor: i64,
    docs: Vec<(String, Record)>,
}

/// What a subscriber has to do to catch up.
enum Catchup {
    Changes(Vec<ChangeRow>),
    /// The log was pruned past the cursor; start over from this state.
    Reload(ScopeState),
}

impl SqliteStore {
    /// Open the store described by `config`, creating the schema if needed.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let conn = match &config.path {
            Some(path) => {
                let conn = Connection::open(path)?;
                conn.busy_timeout(Duration::from_secs(5))?;
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(SCHEMA)?;
        let head_seq: i64 =
            conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM changes", [], |row| row.get(0))?;
        let (head, _) = watch::channel(head_seq);

        tracing::debug!(
            namespace = %config.namespace,
            path = ?config.path,
            head_seq,
            retained_changes = config.retained_changes,
            "document store opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                namespace: config.namespace.clone(),
                poll_interval: config.poll_interval,
                retained_changes: i64::from(config.retained_changes.max(1)),
                head,
            }),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn open_in_memory(namespace: &str) -> StoreResult<Self> {
        Self::open(&StoreConfig::in_memory(namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Current body of a document, read directly (no subscription).
    ///
    /// Blocks the calling thread on the connection.
    pub fn get(&self, doc: &DocPath) -> StoreResult<Option<Record>> {
        let conn = self.inner.lock()?;
        read_body(&conn, &self.inner.namespace, doc)
    }

    /// Number of documents in a collection. Blocks like [`SqliteStore::get`].
    pub fn count(&self, collection: &CollectionPath) -> StoreResult<usize> {
        let conn = self.inner.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE namespace = ?1 AND collection = ?2",
            params![self.inner.namespace, collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Run `work` with the connection on the blocking pool.
    async fn blocking<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner, &mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut conn = inner.lock()?;
            work(&inner, &mut conn)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("store task failed: {err}")))?
    }

    /// Run `write` in a transaction, log the change, prune the log, and wake
    /// subscribers.
    ///
    /// `write` reports what it did; [`Committed::Unchanged`] commits nothing
    /// and wakes nobody.
    async fn commit<F>(&self, doc: DocPath, write: F) -> StoreResult<()>
    where
        F: FnOnce(&Transaction<'_>, &str, &DocPath) -> StoreResult<Committed> + Send + 'static,
    {
        self.blocking(move |inner, conn| {
            let tx = conn.transaction()?;
            let ns = inner.namespace.as_str();

            let body = match write(&tx, ns, &doc)? {
                Committed::Unchanged => return Ok(()),
                Committed::Written(body) => Some(serde_json::to_string(&body)?),
                Committed::Deleted => None,
            };
            tx.execute(
                "INSERT INTO changes (namespace, collection, doc_id, body) VALUES (?1, ?2, ?3, ?4)",
                params![ns, doc.collection().as_str(), doc.id(), body],
            )?;
            let seq = tx.last_insert_rowid();
            let pruned = tx.execute(
                "DELETE FROM changes WHERE seq <= ?1",
                params![seq - inner.retained_changes],
            )?;
            tx.commit()?;

            if pruned > 0 {
                tracing::trace!(seq, pruned, "commit log pruned");
            }
            // Sent under the connection lock so the head only moves forward.
            inner.head.send_replace(seq);
            Ok(())
        })
        .await
    }

    /// Initial snapshot rows and the commit-log cursor, read atomically.
    async fn open_scope(&self, scope: Scope) -> StoreResult<ScopeState> {
        self.blocking(move |inner, conn| {
            let tx = conn.transaction()?;
            let state = read_scope(&tx, &inner.namespace, &scope)?;
            tx.commit()?;
            Ok(state)
        })
        .await
    }

    /// Commit-log rows for `scope` after `cursor`, or a fresh scope state when
    /// rows after `cursor` have been pruned.
    async fn catch_up(&self, scope: Scope, cursor: i64) -> StoreResult<Catchup> {
        self.blocking(move |inner, conn| {
            let tx = conn.transaction()?;
            let ns = inner.namespace.as_str();
            let oldest: Option<i64> =
                tx.query_row("SELECT MIN(seq) FROM changes", [], |row| row.get(0))?;

            // Sequence numbers are contiguous until pruning removes a prefix.
            let catchup = if oldest.is_some_and(|oldest| oldest > cursor + 1) {
                Catchup::Reload(read_scope(&tx, ns, &scope)?)
            } else {
                Catchup::Changes(changes_since(&tx, ns, &scope, cursor)?)
            };
            tx.commit()?;
            Ok(catchup)
        })
        .await
    }

    async fn tail<R: Replica>(
        &self,
        scope: Scope,
        mut replica: R,
    ) -> StoreResult<Subscription<R::Snapshot>> {
        let state = self.open_scope(scope.clone()).await?;
        for (id, body) in state.docs {
            replica.apply(id, Some(body));
        }
        let tail = Tail {
            store: self.clone(),
            head: self.inner.head.subscribe(),
            scope,
            cursor: state.cursor,
            replica,
            pending: VecDeque::new(),
            emit_initial: true,
        };

        Ok(Subscription::new(stream::unfold(Some(tail), |state| async move {
            let mut tail = state?;
            match tail.next_snapshot().await {
                Ok(snapshot) => Some((Ok(snapshot), Some(tail))),
                Err(err) => {
                    tracing::error!(scope = ?tail.scope, error = %err, "subscription lost");
                    Some((Err(StoreError::SubscriptionLost(err.to_string())), None))
                }
            }
        })))
    }
}

/// Outcome of a transactional write.
enum Committed {
    Written(Record),
    Deleted,
    Unchanged,
}

fn read_body(conn: &Connection, ns: &str, doc: &DocPath) -> StoreResult<Option<Record>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE namespace = ?1 AND collection = ?2 AND doc_id = ?3",
            params![ns, doc.collection().as_str(), doc.id()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
}

fn upsert(tx: &Transaction<'_>, ns: &str, doc: &DocPath, body: &Record) -> StoreResult<()> {
    tx.execute(
        r#"
        INSERT INTO documents (namespace, collection, doc_id, body)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(namespace, collection, doc_id) DO UPDATE SET
            body = excluded.body,
            updated_at = datetime('now')
        "#,
        params![ns, doc.collection().as_str(), doc.id(), serde_json::to_string(body)?],
    )?;
    Ok(())
}

fn read_scope(conn: &Connection, ns: &str, scope: &Scope) -> StoreResult<ScopeState> {
    let cursor: i64 =
        conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM changes", [], |row| row.get(0))?;

    let rows = match scope {
        Scope::Collection(collection) => {
            let mut stmt = conn.prepare(
                r#"
                SELECT doc_id, body FROM documents
                WHERE namespace = ?1 AND collection = ?2
                ORDER BY doc_id
                "#,
            )?;
            let raw = stmt
                .query_map(params![ns, collection.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            raw
        }
        Scope::Document(doc) => {
            let body: Option<String> = conn
                .query_row(
                    r#"
                    SELECT body FROM documents
                    WHERE namespace = ?1 AND collection = ?2 AND doc_id = ?3
                    "#,
                    params![ns, doc.collection().as_str(), doc.id()],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| vec![(doc.id().to_string(), b)]).unwrap_or_default()
        }
    };

    let mut docs = Vec::with_capacity(rows.len());
    for (id, body) in rows {
        docs.push((id, serde_json::from_str(&body)?));
    }
    Ok(ScopeState { cursor, docs })
}

/// Commit-log rows for `scope` after `cursor`, oldest first.
fn changes_since(
    conn: &Connection,
    ns: &str,
    scope: &Scope,
    cursor: i64,
) -> StoreResult<Vec<ChangeRow>> {
    let map_row = |row: &rusqlite::Row<'_>| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    };

    let raw = match scope {
        Scope::Collection(_) => {
            let mut stmt = conn.prepare(
                r#"
                SELECT seq, doc_id, body FROM changes
                WHERE namespace = ?1 AND collection = ?2 AND seq > ?3
                ORDER BY seq
                LIMIT ?4
                "#,
            )?;
            let rows = stmt
                .query_map(params![ns, scope.collection(), cursor, CHANGE_BATCH], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        Scope::Document(doc) => {
            let mut stmt = conn.prepare(
                r#"
                SELECT seq, doc_id, body FROM changes
                WHERE namespace = ?1 AND collection = ?2 AND doc_id = ?3 AND seq > ?4
                ORDER BY seq
                LIMIT ?5
                "#,
            )?;
            let rows = stmt
                .query_map(
                    params![ns, scope.collection(), doc.id(), cursor, CHANGE_BATCH],
                    map_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    let mut changes = Vec::with_capacity(raw.len());
    for (seq, doc_id, body) in raw {
        let body = body.map(|b| serde_json::from_str(&b)).transpose()?;
        changes.push(ChangeRow { seq, doc_id, body });
    }
    Ok(changes)
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn create(&self, collection: &CollectionPath, record: Record) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.commit(collection.doc(id.clone()), move |tx, ns, doc| {
            upsert(tx, ns, doc, &record)?;
            Ok(Committed::Written(record))
        })
        .await?;
        Ok(id)
    }

    async fn set(&self, doc: &DocPath, record: Record) -> StoreResult<()> {
        self.commit(doc.clone(), move |tx, ns, doc| {
            upsert(tx, ns, doc, &record)?;
            Ok(Committed::Written(record))
        })
        .await
    }

    async fn update(&self, doc: &DocPath, fields: Record) -> StoreResult<()> {
        self.commit(doc.clone(), move |tx, ns, doc| {
            let mut body =
                read_body(tx, ns, doc)?.ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
            for (key, value) in fields {
                body.insert(key, value);
            }
            upsert(tx, ns, doc, &body)?;
            Ok(Committed::Written(body))
        })
        .await
    }

    async fn delete(&self, doc: &DocPath) -> StoreResult<()> {
        self.commit(doc.clone(), |tx, ns, doc| {
            let removed = tx.execute(
                "DELETE FROM documents WHERE namespace = ?1 AND collection = ?2 AND doc_id = ?3",
                params![ns, doc.collection().as_str(), doc.id()],
            )?;
            Ok(if removed > 0 {
                Committed::Deleted
            } else {
                Committed::Unchanged
            })
        })
        .await
    }

    async fn subscribe_collection(
        &self,
        collection: &CollectionPath,
    ) -> StoreResult<Subscription<CollectionSnapshot>> {
        self.tail(
            Scope::Collection(collection.clone()),
            CollectionReplica {
                collection: collection.clone(),
                documents: BTreeMap::new(),
            },
        )
        .await
    }

    async fn subscribe_document(
        &self,
        doc: &DocPath,
    ) -> StoreResult<Subscription<DocumentSnapshot>> {
        self.tail(
            Scope::Document(doc.clone()),
            DocumentReplica {
                path: doc.clone(),
                data: None,
            },
        )
        .await
    }
}

// =========================================================================
// Subscription tailing
// =========================================================================

/// Subscriber-side copy of the watched state.
trait Replica: Send + 'static {
    type Snapshot: Send + 'static;

    fn apply(&mut self, doc_id: String, body: Option<Record>);
    fn clear(&mut self);
    fn snapshot(&self) -> Self::Snapshot;
}

struct CollectionReplica {
    collection: CollectionPath,
    documents: BTreeMap<String, Record>,
}

impl Replica for CollectionReplica {
    type Snapshot = CollectionSnapshot;

    fn apply(&mut self, doc_id: String, body: Option<Record>) {
        match body {
            Some(body) => {
                self.documents.insert(doc_id, body);
            }
            None => {
                self.documents.remove(&doc_id);
            }
        }
    }

    fn clear(&mut self) {
        self.documents.clear();
    }

    fn snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            collection: self.collection.clone(),
            documents: self
                .documents
                .iter()
                .map(|(id, data)| StoredDocument {
                    id: id.clone(),
                    data: data.clone(),
                })
                .collect(),
        }
    }
}

struct DocumentReplica {
    path: DocPath,
    data: Option<Record>,
}

impl Replica for DocumentReplica {
    type Snapshot = DocumentSnapshot;

    fn apply(&mut self, _doc_id: String, body: Option<Record>) {
        self.data = body;
    }

    fn clear(&mut self) {
        self.data = None;
    }

    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            path: self.path.clone(),
            data: self.data.clone(),
        }
    }
}

struct Tail<R> {
    store: SqliteStore,
    head: watch::Receiver<i64>,
    scope: Scope,
    cursor: i64,
    replica: R,
    pending: VecDeque<ChangeRow>,
    emit_initial: bool,
}

impl<R: Replica> Tail<R> {
    async fn next_snapshot(&mut self) -> StoreResult<R::Snapshot> {
        if self.emit_initial {
            self.emit_initial = false;
            return Ok(self.replica.snapshot());
        }

        loop {
            if let Some(change) = self.pending.pop_front() {
                self.replica.apply(change.doc_id, change.body);
                return Ok(self.replica.snapshot());
            }

            // Mark the head seen before reading so a commit racing the read
            // still wakes the wait below.
            self.head.borrow_and_update();
            match self.store.catch_up(self.scope.clone(), self.cursor).await? {
                Catchup::Changes(changes) => {
                    if let Some(last) = changes.last() {
                        self.cursor = last.seq;
                        self.pending.extend(changes);
                        continue;
                    }
                }
                Catchup::Reload(state) => {
                    tracing::warn!(
                        scope = ?self.scope,
                        from = self.cursor,
                        to = state.cursor,
                        "commit log pruned past cursor, reloading"
                    );
                    self.cursor = state.cursor;
                    self.replica.clear();
                    for (id, body) in state.docs {
                        self.replica.apply(id, Some(body));
                    }
                    return Ok(self.replica.snapshot());
                }
            }

            let poll = self.store.inner.poll_interval;
            tokio::select! {
                changed = self.head.changed() => {
                    if changed.is_err() {
                        return Err(StoreError::SubscriptionLost("store closed".into()));
                    }
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}
