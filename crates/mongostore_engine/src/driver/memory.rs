//! In-memory driver with failure injection.

use super::{DocumentStream, DriverCollection, DriverConnection, StoreDriver};
use crate::config::{ConnectionDescriptor, Credentials};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use futures::StreamExt;
use mongostore_core::{MetaDoc, STORE_ID_FIELD};
use parking_lot::Mutex;
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

type Collections = HashMap<String, Vec<Document>>;

#[derive(Default)]
struct MemoryState {
    databases: Mutex<HashMap<String, Collections>>,
    offline: AtomicBool,
    epoch: AtomicU64,
    failing_opens: AtomicU32,
    reject_credentials: AtomicBool,
    injected: Mutex<VecDeque<StoreError>>,
    opens: AtomicU32,
    closes: AtomicU32,
    authentications: AtomicU32,
}

/// An in-process document store behind the driver traits.
///
/// Clones share state, so a test can keep a handle to inject failures into a
/// store that owns another clone. Filters support equality and the `$eq`,
/// `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in` and `$exists` operators.
///
/// # Example
///
/// ```rust
/// use mongostore_engine::{MemoryDriver, StoreError};
///
/// let driver = MemoryDriver::new();
/// driver.fail_next_opens(2);
/// driver.fail_next_op(StoreError::operation("E11000 duplicate key"));
/// assert_eq!(driver.open_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<MemoryState>,
}

impl MemoryDriver {
    /// Creates an empty, reachable store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every open connection and refuses new ones until [`restore`](Self::restore).
    pub fn disconnect(&self) {
        self.state.offline.store(true, Ordering::SeqCst);
        self.state.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Accepts connections again. Connections dropped earlier stay dead.
    pub fn restore(&self) {
        self.state.offline.store(false, Ordering::SeqCst);
    }

    /// Drops every open connection; new ones are accepted.
    pub fn drop_connections(&self) {
        self.state.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether new connections are accepted.
    pub fn is_online(&self) -> bool {
        !self.state.offline.load(Ordering::SeqCst)
    }

    /// Refuses the next `n` opens with a connectivity error.
    pub fn fail_next_opens(&self, n: u32) {
        self.state.failing_opens.store(n, Ordering::SeqCst);
    }

    /// Rejects (or accepts again) every authentication attempt.
    pub fn reject_credentials(&self, reject: bool) {
        self.state.reject_credentials.store(reject, Ordering::SeqCst);
    }

    /// Fails the next collection operation with `error`.
    ///
    /// Calls queue; each operation consumes one.
    pub fn fail_next_op(&self, error: StoreError) {
        self.state.injected.lock().push_back(error);
    }

    /// Number of open attempts.
    pub fn open_count(&self) -> u32 {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Number of closed connections.
    pub fn close_count(&self) -> u32 {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Number of authentication attempts.
    pub fn auth_count(&self) -> u32 {
        self.state.authentications.load(Ordering::SeqCst)
    }

    /// Snapshot of a collection's documents, in insertion order.
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.state
            .databases
            .lock()
            .get(database)
            .and_then(|collections| collections.get(collection))
            .cloned()
            .unwrap_or_default()
    }

    /// Names of the collections holding documents in `database`.
    pub fn collection_names(&self, database: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .databases
            .lock()
            .get(database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl StoreDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> StoreResult<Arc<dyn DriverConnection>> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        let database = descriptor.database_name()?.to_string();
        descriptor.resolve_endpoints()?;

        let refused = self
            .state
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused || !self.is_online() {
            return Err(StoreError::connectivity("connect ECONNREFUSED"));
        }

        Ok(Arc::new(MemoryConnection {
            inner: Arc::new(ConnectionInner {
                state: Arc::clone(&self.state),
                database,
                epoch: self.state.epoch.load(Ordering::SeqCst),
                closed: AtomicBool::new(false),
            }),
        }))
    }
}

struct ConnectionInner {
    state: Arc<MemoryState>,
    database: String,
    epoch: u64,
    closed: AtomicBool,
}

impl ConnectionInner {
    fn check_live(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::connectivity("notConnected"));
        }
        if self.state.epoch.load(Ordering::SeqCst) != self.epoch {
            return Err(StoreError::connectivity("no open connections"));
        }
        Ok(())
    }

    fn begin_op(&self) -> StoreResult<()> {
        if let Some(err) = self.state.injected.lock().pop_front() {
            return Err(err);
        }
        self.check_live()
    }

    fn with_docs<T>(&self, collection: &str, f: impl FnOnce(&mut Vec<Document>) -> T) -> T {
        let mut databases = self.state.databases.lock();
        let docs = databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        f(docs)
    }
}

/// A connection held by [`MemoryDriver`].
pub struct MemoryConnection {
    inner: Arc<ConnectionInner>,
}

impl MemoryConnection {
    /// The database this connection operates on.
    pub fn database(&self) -> &str {
        &self.inner.database
    }

    /// Whether the connection is still usable.
    pub fn is_live(&self) -> bool {
        self.inner.check_live().is_ok()
    }
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    async fn authenticate(&self, credentials: &Credentials) -> StoreResult<()> {
        self.inner.state.authentications.fetch_add(1, Ordering::SeqCst);
        self.inner.check_live()?;
        if self.inner.state.reject_credentials.load(Ordering::SeqCst) {
            return Err(StoreError::authentication(format!(
                "auth failed for user {}",
                credentials.username
            )));
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.check_live()
    }

    fn collection(&self, name: &str) -> Arc<dyn DriverCollection> {
        Arc::new(MemoryCollection {
            conn: Arc::clone(&self.inner),
            name: name.to_string(),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MemoryCollection {
    conn: Arc<ConnectionInner>,
    name: String,
}

impl MemoryCollection {
    fn matching(&self, filter: &Document, meta: &MetaDoc) -> StoreResult<Vec<Document>> {
        let mut found = self.conn.with_docs(&self.name, |docs| {
            docs.iter()
                .filter_map(|doc| match matches(doc, filter) {
                    Ok(true) => Some(Ok(doc.clone())),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                })
                .collect::<StoreResult<Vec<_>>>()
        })?;

        if let Some(keys) = &meta.sort {
            found.sort_by(|a, b| {
                keys.iter()
                    .map(|key| {
                        let ord = compare_opt(a.get(&key.field), b.get(&key.field));
                        match key.direction {
                            mongostore_core::SortDirection::Ascending => ord,
                            mongostore_core::SortDirection::Descending => ord.reverse(),
                        }
                    })
                    .find(|ord| *ord != CmpOrdering::Equal)
                    .unwrap_or(CmpOrdering::Equal)
            });
        }

        let skip = usize::try_from(meta.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let mut found: Vec<Document> = found.into_iter().skip(skip).collect();

        if let Some(limit) = meta.limit.filter(|&n| n != 0) {
            found.truncate(usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX));
        }

        if let Some(fields) = &meta.fields {
            found = found.into_iter().map(|doc| project(doc, fields)).collect();
        }

        Ok(found)
    }
}

#[async_trait]
impl DriverCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, mut doc: Document) -> StoreResult<Bson> {
        self.conn.begin_op()?;

        let id = doc
            .remove(STORE_ID_FIELD)
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
        let mut stored = Document::new();
        stored.insert(STORE_ID_FIELD, id.clone());
        for (key, value) in doc {
            stored.insert(key, value);
        }

        let database = self.conn.database.clone();
        self.conn.with_docs(&self.name, |docs| {
            if docs.iter().any(|d| d.get(STORE_ID_FIELD) == Some(&id)) {
                return Err(StoreError::operation(format!(
                    "E11000 duplicate key error collection: {database}.{} index: _id_ dup key: {id}",
                    self.name
                )));
            }
            docs.push(stored);
            Ok(id)
        })
    }

    async fn replace_upsert(&self, filter: Document, mut doc: Document) -> StoreResult<()> {
        self.conn.begin_op()?;
        doc.remove(STORE_ID_FIELD);

        self.conn.with_docs(&self.name, |docs| {
            let mut position = None;
            for (i, existing) in docs.iter().enumerate() {
                if matches(existing, &filter)? {
                    position = Some(i);
                    break;
                }
            }

            let id = match position {
                Some(i) => docs[i].get(STORE_ID_FIELD).cloned(),
                None => match filter.get(STORE_ID_FIELD) {
                    Some(Bson::Document(d)) if is_operator_doc(d) => None,
                    other => other.cloned(),
                },
            }
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

            let mut stored = Document::new();
            stored.insert(STORE_ID_FIELD, id);
            for (key, value) in doc {
                stored.insert(key, value);
            }

            match position {
                Some(i) => docs[i] = stored,
                None => docs.push(stored),
            }
            Ok(())
        })
    }

    async fn find_one(&self, filter: Document, meta: &MetaDoc) -> StoreResult<Option<Document>> {
        self.conn.begin_op()?;
        let meta = MetaDoc {
            limit: Some(1),
            ..meta.clone()
        };
        Ok(self.matching(&filter, &meta)?.into_iter().next())
    }

    async fn find(&self, filter: Document, meta: &MetaDoc) -> StoreResult<DocumentStream> {
        self.conn.begin_op()?;
        let found = self.matching(&filter, meta)?;
        Ok(futures::stream::iter(found.into_iter().map(Ok)).boxed())
    }

    async fn delete_one(&self, filter: Document) -> StoreResult<u64> {
        self.conn.begin_op()?;
        self.conn.with_docs(&self.name, |docs| {
            for i in 0..docs.len() {
                if matches(&docs[i], &filter)? {
                    docs.remove(i);
                    return Ok(1);
                }
            }
            Ok(0)
        })
    }

    async fn delete_many(&self, filter: Document) -> StoreResult<u64> {
        self.conn.begin_op()?;
        self.conn.with_docs(&self.name, |docs| {
            let mut doomed = Vec::with_capacity(docs.len());
            for doc in docs.iter() {
                doomed.push(matches(doc, &filter)?);
            }

            let before = docs.len();
            let mut flags = doomed.into_iter();
            docs.retain(|_| !flags.next().unwrap_or(false));
            Ok((before - docs.len()) as u64)
        })
    }
}

fn is_operator_doc(doc: &Document) -> bool {
    doc.keys().next().map_or(false, |k| k.starts_with('$'))
}

fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        if !matches_condition(doc.get(key), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    let Bson::Document(ops) = condition else {
        return Ok(equals_opt(value, condition));
    };
    if !is_operator_doc(ops) {
        return Ok(equals_opt(value, condition));
    }

    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals_opt(value, arg),
            "$ne" => !equals_opt(value, arg),
            "$gt" => value.map_or(false, |v| compare(v, arg) == Some(CmpOrdering::Greater)),
            "$gte" => value.map_or(false, |v| {
                matches!(compare(v, arg), Some(CmpOrdering::Greater | CmpOrdering::Equal))
            }),
            "$lt" => value.map_or(false, |v| compare(v, arg) == Some(CmpOrdering::Less)),
            "$lte" => value.map_or(false, |v| {
                matches!(compare(v, arg), Some(CmpOrdering::Less | CmpOrdering::Equal))
            }),
            "$in" => match arg {
                Bson::Array(items) => items.iter().any(|item| equals_opt(value, item)),
                _ => return Err(StoreError::operation("$in needs an array")),
            },
            "$exists" => value.is_some() == truthy(arg),
            other => {
                return Err(StoreError::operation(format!(
                    "unsupported query operator: {other}"
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality where a missing field equals null and arrays match any element.
fn equals_opt(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| equals(item, expected))
        }
        Some(v) => equals(v, expected),
    }
}

fn equals(a: &Bson, b: &Bson) -> bool {
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<CmpOrdering> {
    if let (Some(x), Some(y)) = (number(a), number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        _ => None,
    }
}

/// Sort order: missing values first, incomparable values equal.
fn compare_opt(a: Option<&Bson>, b: Option<&Bson>) -> CmpOrdering {
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(x), Some(y)) => compare(x, y).unwrap_or(CmpOrdering::Equal),
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Null => false,
        Bson::Boolean(b) => *b,
        other => number(other).map_or(true, |n| n != 0.0),
    }
}

fn project(doc: Document, fields: &Document) -> Document {
    let inclusive = fields
        .iter()
        .any(|(key, flag)| key != STORE_ID_FIELD && truthy(flag));

    if inclusive {
        let keep_id = fields.get(STORE_ID_FIELD).map_or(true, truthy);
        doc.into_iter()
            .filter(|(key, _)| {
                if key == STORE_ID_FIELD {
                    keep_id
                } else {
                    fields.get(key).map_or(false, truthy)
                }
            })
            .collect()
    } else {
        doc.into_iter()
            .filter(|(key, _)| fields.get(key).map_or(true, truthy))
            .collect()
    }
}
