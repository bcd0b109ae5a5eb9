//! In-process northbound database.
//!
//! Rows are kept as JSON objects per table. A transaction is applied to a
//! copy of the tables and swapped in only after every operation and every
//! index check succeeded, so a failed transaction leaves nothing behind.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use super::ops::{Condition, Mutation, Mutator, Operation, OperationResult, Row, UUID_COLUMN, empty_like};
use super::{Connection, DbError, Schema, TableUpdate};

type Table = BTreeMap<String, Row>;
type Tables = BTreeMap<String, Table>;

/// Serialized database contents, one array of rows per table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub tables: BTreeMap<String, Vec<Row>>,
}

/// One-shot failure armed with [`MemoryDb::inject_fault`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fails the next select of `table`, or of any table when `None`.
    Select { table: Option<String> },
    /// Aborts the next transaction touching `table`, or any transaction when `None`.
    Transact { table: Option<String> },
}

pub struct MemoryDb {
    schema: Schema,
    tables: RwLock<Tables>,
    events: broadcast::Sender<TableUpdate>,
    faults: Mutex<VecDeque<Fault>>,
    latency: Mutex<Option<Duration>>,
    transactions: AtomicU64,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::with_schema(Schema::northbound())
    }

    pub fn with_schema(schema: Schema) -> Self {
        let tables = schema.tables().map(|t| (t.name.to_string(), Table::new())).collect();
        let (events, _) = broadcast::channel(1024);
        Self {
            schema,
            tables: RwLock::new(tables),
            events,
            faults: Mutex::new(VecDeque::new()),
            latency: Mutex::new(None),
            transactions: AtomicU64::new(0),
        }
    }

    /// Builds a database from a snapshot. Rows without `_uuid` get a fresh one.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, DbError> {
        let mut db = Self::new();
        {
            let tables = db.tables.get_mut();
            for (name, rows) in snapshot.tables {
                if db.schema.table(&name).is_none() {
                    return Err(DbError::UnknownTable(name));
                }
                let table = tables.entry(name.clone()).or_default();
                for mut row in rows {
                    let uuid = match row.get(UUID_COLUMN) {
                        Some(Value::String(uuid)) if !uuid.is_empty() => uuid.clone(),
                        None | Some(Value::Null) | Some(Value::String(_)) => Uuid::new_v4().to_string(),
                        Some(other) => {
                            return Err(DbError::MalformedRow {
                                table: name,
                                reason: format!("_uuid must be a string, got {other}"),
                            });
                        }
                    };
                    normalize_row(&mut row);
                    row.insert(UUID_COLUMN.to_string(), Value::String(uuid.clone()));
                    table.insert(uuid, row);
                }
            }
            check_indexes(&db.schema, tables)?;
        }
        Ok(db)
    }

    pub async fn snapshot(&self) -> Snapshot {
        let tables = self.tables.read().await;
        Snapshot {
            tables: tables
                .iter()
                .map(|(name, rows)| (name.clone(), rows.values().cloned().collect()))
                .collect(),
        }
    }

    /// Inserts a row directly, outside any transaction. Returns its UUID.
    pub async fn seed(&self, table: &str, mut row: Row) -> Result<String, DbError> {
        if self.schema.table(table).is_none() {
            return Err(DbError::UnknownTable(table.to_string()));
        }
        let uuid = Uuid::new_v4().to_string();
        normalize_row(&mut row);
        row.insert(UUID_COLUMN.to_string(), Value::String(uuid.clone()));
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(uuid.clone(), row);
        Ok(uuid)
    }

    pub fn inject_fault(&self, fault: Fault) {
        lock(&self.faults).push_back(fault);
    }

    /// Delays every transaction by `latency` before it is applied.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Number of transactions submitted so far, including failed ones.
    pub fn transaction_count(&self) -> u64 {
        self.transactions.load(Ordering::SeqCst)
    }

    fn take_fault(&self, matches: impl Fn(&Fault) -> bool) -> bool {
        let mut faults = lock(&self.faults);
        match faults.iter().position(matches) {
            Some(pos) => {
                faults.remove(pos);
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for MemoryDb {
    async fn select(&self, table: &str) -> Result<Vec<Row>, DbError> {
        if self.take_fault(|f| matches!(f, Fault::Select { table: t } if t.as_deref().is_none_or(|t| t == table))) {
            return Err(DbError::NotConnected);
        }
        let tables = self.tables.read().await;
        match tables.get(table) {
            Some(rows) => Ok(rows.values().cloned().collect()),
            None => Err(DbError::UnknownTable(table.to_string())),
        }
    }

    async fn transact(&self, ops: Vec<Operation>) -> Result<Vec<OperationResult>, DbError> {
        self.transactions.fetch_add(1, Ordering::SeqCst);

        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let touches = |t: &str| ops.iter().any(|op| op.table() == t);
        if self.take_fault(|f| matches!(f, Fault::Transact { table } if table.as_deref().is_none_or(touches))) {
            return Err(DbError::Aborted("injected failure".to_string()));
        }

        let mut tables = self.tables.write().await;
        let mut working = tables.clone();
        let mut results = Vec::with_capacity(ops.len());
        {
            let mut txn = Transaction {
                schema: &self.schema,
                tables: &mut working,
                named: HashMap::new(),
            };
            for op in ops {
                results.push(txn.apply(op)?);
            }
        }
        check_indexes(&self.schema, &working)?;

        let updates = diff(&tables, &working);
        *tables = working;
        drop(tables);

        debug!(changes = updates.len(), "Committed transaction");
        for update in updates {
            // No subscribers is fine.
            let _ = self.events.send(update);
        }
        Ok(results)
    }

    fn subscribe(&self) -> broadcast::Receiver<TableUpdate> {
        self.events.subscribe()
    }
}

struct Transaction<'a> {
    schema: &'a Schema,
    tables: &'a mut Tables,
    named: HashMap<String, String>,
}

impl Transaction<'_> {
    fn apply(&mut self, op: Operation) -> Result<OperationResult, DbError> {
        let table_name = op.table().to_string();
        if self.schema.table(&table_name).is_none() {
            return Err(DbError::UnknownTable(table_name));
        }

        match op {
            Operation::Insert { row, uuid_name, .. } => {
                let uuid = Uuid::new_v4().to_string();
                if let Some(name) = uuid_name {
                    if self.named.insert(name.clone(), uuid.clone()).is_some() {
                        return Err(DbError::DuplicateUuidName(name));
                    }
                }
                let mut row = resolve_row(row, &self.named);
                row.remove(UUID_COLUMN);
                normalize_row(&mut row);
                row.insert(UUID_COLUMN.to_string(), Value::String(uuid.clone()));
                self.table_mut(&table_name).insert(uuid.clone(), row);
                Ok(OperationResult::inserted(uuid))
            }
            Operation::Update { conditions, row, .. } => {
                if row.contains_key(UUID_COLUMN) {
                    return Err(DbError::ImmutableColumn {
                        table: table_name,
                        column: UUID_COLUMN.to_string(),
                    });
                }
                let mut row = resolve_row(row, &self.named);
                normalize_row(&mut row);
                let conditions = resolve_conditions(conditions, &self.named);

                let mut count = 0;
                for existing in self.table_mut(&table_name).values_mut() {
                    if !matches_all(&conditions, existing) {
                        continue;
                    }
                    for (column, value) in &row {
                        existing.insert(column.clone(), value.clone());
                    }
                    count += 1;
                }
                Ok(OperationResult::counted(count))
            }
            Operation::Mutate {
                conditions,
                mutations,
                ..
            } => {
                let conditions = resolve_conditions(conditions, &self.named);
                let mutations: Vec<Mutation> = mutations
                    .into_iter()
                    .map(|mut m| {
                        m.value = resolve(m.value, &self.named);
                        m
                    })
                    .collect();

                let mut count = 0;
                for existing in self.table_mut(&table_name).values_mut() {
                    if !matches_all(&conditions, existing) {
                        continue;
                    }
                    for mutation in &mutations {
                        apply_mutation(&table_name, existing, mutation)?;
                    }
                    count += 1;
                }
                Ok(OperationResult::counted(count))
            }
            Operation::Delete { conditions, .. } => {
                let conditions = resolve_conditions(conditions, &self.named);
                let table = self.table_mut(&table_name);
                let before = table.len();
                table.retain(|_, row| !matches_all(&conditions, row));
                Ok(OperationResult::counted(before - table.len()))
            }
        }
    }

    fn table_mut(&mut self, name: &str) -> &mut Table {
        self.tables.entry(name.to_string()).or_default()
    }
}

fn apply_mutation(table: &str, row: &mut Row, mutation: &Mutation) -> Result<(), DbError> {
    let current = row
        .entry(mutation.column.clone())
        .or_insert_with(|| empty_like(&mutation.value));
    if current.is_null() {
        *current = empty_like(&mutation.value);
    }

    match (current, mutation.mutator, &mutation.value) {
        (Value::Array(items), Mutator::Insert, Value::Array(added)) => {
            items.extend(added.iter().cloned());
            sort_set(items);
        }
        (Value::Array(items), Mutator::Delete, Value::Array(removed)) => {
            items.retain(|v| !removed.contains(v));
        }
        (Value::Object(map), Mutator::Insert, Value::Object(pairs)) => {
            for (key, value) in pairs {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        (Value::Object(map), Mutator::Delete, Value::Object(pairs)) => {
            for (key, value) in pairs {
                if map.get(key) == Some(value) {
                    map.remove(key);
                }
            }
        }
        (Value::Object(map), Mutator::Delete, Value::Array(keys)) => {
            for key in keys.iter().filter_map(Value::as_str) {
                map.remove(key);
            }
        }
        (current, _, value) => {
            return Err(DbError::InvalidMutation {
                table: table.to_string(),
                column: mutation.column.clone(),
                reason: format!("cannot apply {value} to {current}"),
            });
        }
    }
    Ok(())
}

fn matches_all(conditions: &[Condition], row: &Row) -> bool {
    conditions.iter().all(|c| c.matches(row))
}

fn resolve(value: Value, named: &HashMap<String, String>) -> Value {
    if named.is_empty() {
        return value;
    }
    match value {
        Value::String(s) => match named.get(&s) {
            Some(uuid) => Value::String(uuid.clone()),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(|v| resolve(v, named)).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, resolve(v, named))).collect()),
        other => other,
    }
}

fn resolve_row(row: Row, named: &HashMap<String, String>) -> Row {
    row.into_iter().map(|(k, v)| (k, resolve(v, named))).collect()
}

fn resolve_conditions(conditions: Vec<Condition>, named: &HashMap<String, String>) -> Vec<Condition> {
    conditions
        .into_iter()
        .map(|c| Condition {
            column: c.column,
            value: resolve(c.value, named),
        })
        .collect()
}

/// Set columns are stored sorted and without duplicates.
fn normalize_row(row: &mut Row) {
    for value in row.values_mut() {
        if let Value::Array(items) = value {
            sort_set(items);
        }
    }
}

fn sort_set(items: &mut Vec<Value>) {
    items.sort_by_key(|v| v.to_string());
    items.dedup();
}

fn check_indexes(schema: &Schema, tables: &Tables) -> Result<(), DbError> {
    for table in schema.tables() {
        let Some(rows) = tables.get(table.name) else {
            continue;
        };
        for column in table.indexes {
            let mut seen = HashSet::new();
            for row in rows.values() {
                let Some(value) = row.get(*column).and_then(Value::as_str).filter(|v| !v.is_empty()) else {
                    continue;
                };
                if !seen.insert(value) {
                    return Err(DbError::ConstraintViolation {
                        table: table.name.to_string(),
                        column: column.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn diff(old: &Tables, new: &Tables) -> Vec<TableUpdate> {
    let mut updates = Vec::new();
    let empty = Table::new();
    for (name, new_rows) in new {
        let old_rows = old.get(name).unwrap_or(&empty);
        for (uuid, row) in new_rows {
            match old_rows.get(uuid) {
                None => updates.push(TableUpdate::Inserted {
                    table: name.clone(),
                    uuid: uuid.clone(),
                    row: row.clone(),
                }),
                Some(previous) if previous != row => updates.push(TableUpdate::Modified {
                    table: name.clone(),
                    uuid: uuid.clone(),
                    old: previous.clone(),
                    new: row.clone(),
                }),
                Some(_) => {}
            }
        }
        for (uuid, row) in old_rows {
            if !new_rows.contains_key(uuid) {
                updates.push(TableUpdate::Deleted {
                    table: name.clone(),
                    uuid: uuid.clone(),
                    old: row.clone(),
                });
            }
        }
    }
    updates
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    fn insert(table: &str, value: Value) -> Operation {
        Operation::Insert {
            table: table.to_string(),
            row: row(value),
            uuid_name: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_select() {
        let db = MemoryDb::new();
        let results = db
            .transact(vec![insert("Address_Set", json!({"name": "as1", "addresses": ["b", "a", "a"]}))])
            .await
            .unwrap();
        let uuid = results[0].uuid.clone().unwrap();

        let rows = db.select("Address_Set").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["_uuid"], json!(uuid));
        assert_eq!(rows[0]["addresses"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_nothing_behind() {
        let db = MemoryDb::new();
        db.seed("Address_Set", row(json!({"name": "taken"}))).await.unwrap();

        let err = db
            .transact(vec![
                insert("Port_Group", json!({"name": "pg1"})),
                insert("Address_Set", json!({"name": "taken"})),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
        assert!(db.select("Port_Group").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_named_uuid_reference() {
        let db = MemoryDb::new();
        let lb = db.seed("Load_Balancer", row(json!({"name": "lb1"}))).await.unwrap();

        db.transact(vec![
            Operation::Insert {
                table: "Load_Balancer_Health_Check".to_string(),
                row: row(json!({"vip": "10.0.0.1:80"})),
                uuid_name: Some("u0000000001".to_string()),
            },
            Operation::Mutate {
                table: "Load_Balancer".to_string(),
                conditions: vec![Condition::uuid(lb)],
                mutations: vec![Mutation::insert_set("health_check", ["u0000000001"])],
            },
        ])
        .await
        .unwrap();

        let hc = db.select("Load_Balancer_Health_Check").await.unwrap();
        let hc_uuid = hc[0]["_uuid"].clone();
        let lbs = db.select("Load_Balancer").await.unwrap();
        assert_eq!(lbs[0]["health_check"], json!([hc_uuid]));
    }

    #[tokio::test]
    async fn test_map_mutations() {
        let db = MemoryDb::new();
        let lb = db
            .seed("Load_Balancer", row(json!({"name": "lb1", "vips": {"a": "1", "b": "2"}})))
            .await
            .unwrap();
        let mutate = |mutations| Operation::Mutate {
            table: "Load_Balancer".to_string(),
            conditions: vec![Condition::uuid(lb.clone())],
            mutations,
        };

        // Insert never overwrites an existing key.
        let pairs = BTreeMap::from([("a".to_string(), "9".to_string()), ("c".to_string(), "3".to_string())]);
        db.transact(vec![mutate(vec![Mutation::insert_map("vips", &pairs)])]).await.unwrap();
        let rows = db.select("Load_Balancer").await.unwrap();
        assert_eq!(rows[0]["vips"], json!({"a": "1", "b": "2", "c": "3"}));

        // Pair delete needs the value to match; key delete does not.
        let stale = BTreeMap::from([("b".to_string(), "wrong".to_string())]);
        db.transact(vec![mutate(vec![
            Mutation::delete_map("vips", &stale),
            Mutation::delete_keys("vips", ["a", "missing"]),
        ])])
        .await
        .unwrap();
        let rows = db.select("Load_Balancer").await.unwrap();
        assert_eq!(rows[0]["vips"], json!({"b": "2", "c": "3"}));
    }

    #[tokio::test]
    async fn test_update_cannot_touch_uuid() {
        let db = MemoryDb::new();
        let err = db
            .transact(vec![Operation::Update {
                table: "Address_Set".to_string(),
                conditions: vec![],
                row: row(json!({"_uuid": "x"})),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ImmutableColumn { .. }));
    }

    #[tokio::test]
    async fn test_injected_fault_is_one_shot() {
        let db = MemoryDb::new();
        db.inject_fault(Fault::Transact {
            table: Some("Port_Group".to_string()),
        });

        // Other tables are unaffected.
        db.transact(vec![insert("Address_Set", json!({"name": "as1"}))]).await.unwrap();
        assert!(db.transact(vec![insert("Port_Group", json!({"name": "pg1"}))]).await.is_err());
        db.transact(vec![insert("Port_Group", json!({"name": "pg1"}))]).await.unwrap();
        assert_eq!(db.transaction_count(), 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_committed_changes() {
        let db = MemoryDb::new();
        let mut updates = db.subscribe();

        db.transact(vec![insert("Address_Set", json!({"name": "as1"}))]).await.unwrap();
        let update = updates.recv().await.unwrap();
        assert_eq!(update.table(), "Address_Set");
        assert!(matches!(update, TableUpdate::Inserted { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_rejects_duplicate_index_values() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "Port_Group": [{"name": "pg1"}, {"name": "pg1"}]
        }))
        .unwrap();
        assert!(matches!(
            MemoryDb::from_snapshot(snapshot),
            Err(DbError::ConstraintViolation { .. })
        ));

        let snapshot: Snapshot = serde_json::from_value(json!({"Bogus": []})).unwrap();
        assert!(matches!(MemoryDb::from_snapshot(snapshot), Err(DbError::UnknownTable(_))));
    }
}
