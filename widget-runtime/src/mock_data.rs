//! In-memory stand-in for the platform's client object store.
//!
//! Objects have a stable guid, a committed `data` record and staged `changes`.
//! Datasources are JSON-backed ordered collections of objects; each key is
//! re-synchronized whenever its backing text changes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::error::MockDataError;

pub type Guid = String;

/// Absent from this many consecutive syncs → evicted.
const EVICT_AFTER_MISSES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    String,
    Integer,
    Decimal,
    Boolean,
    Object,
    List,
}

impl AttributeType {
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => AttributeType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => AttributeType::Integer,
            Value::Number(_) => AttributeType::Decimal,
            Value::Array(_) => AttributeType::List,
            Value::Object(_) => AttributeType::Object,
            Value::Null | Value::String(_) => AttributeType::String,
        }
    }

    /// Value a freshly created object starts with.
    pub fn default_value(&self) -> Value {
        match self {
            AttributeType::String => Value::String(String::new()),
            AttributeType::Integer => Value::from(0),
            AttributeType::Decimal => Value::from(0.0),
            AttributeType::Boolean => Value::Bool(false),
            AttributeType::Object => Value::Object(Map::new()),
            AttributeType::List => Value::Array(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

/// Attribute name → type. Grows across syncs, never shrinks.
pub type AttributeSchema = BTreeMap<String, AttributeInfo>;

#[derive(Debug, Clone, PartialEq)]
pub struct MockObject {
    pub guid: Guid,
    pub entity: String,
    pub datasource_key: String,
    /// Committed record, what the datasource serializes.
    pub data: Map<String, Value>,
    /// Staged by `set`, written into `data` by `commit`.
    pub changes: Map<String, Value>,
    pub is_new: bool,
    /// Created by bundle code rather than parsed from the datasource text.
    pub dynamic: bool,
}

impl MockObject {
    /// Current value of an attribute: staged change first, then committed data.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.changes.get(attr).or_else(|| self.data.get(attr))
    }

    pub fn has(&self, attr: &str) -> bool {
        self.changes.contains_key(attr) || self.data.contains_key(attr)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        for key in self.changes.keys() {
            if !self.data.contains_key(key) {
                names.push(key.clone());
            }
        }
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceStatus {
    Loading,
    Available,
    Unavailable,
}

impl DatasourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasourceStatus::Loading => "loading",
            DatasourceStatus::Available => "available",
            DatasourceStatus::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasourceState {
    pub key: String,
    pub entity: String,
    pub schema: AttributeSchema,
    pub status: DatasourceStatus,
    /// Ordered guids of the live items.
    live: Vec<Guid>,
    /// Index identity: live items first, then missed guids kept for a regrow.
    slots: Vec<Guid>,
    /// Natural-key identity.
    keyed: HashMap<String, Guid>,
    misses: HashMap<Guid, u8>,
    last_source: Option<String>,
    synced: bool,
}

impl DatasourceState {
    fn new(key: &str, entity: String) -> Self {
        Self {
            key: key.to_string(),
            entity,
            schema: AttributeSchema::new(),
            status: DatasourceStatus::Loading,
            live: Vec::new(),
            slots: Vec::new(),
            keyed: HashMap::new(),
            misses: HashMap::new(),
            last_source: None,
            synced: false,
        }
    }

    pub fn item_guids(&self) -> &[Guid] {
        &self.live
    }

    fn forget(&mut self, guid: &str) {
        self.live.retain(|g| g != guid);
        self.slots.retain(|g| g != guid);
        self.keyed.retain(|_, g| g != guid);
        self.misses.remove(guid);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Backing text identical to the last sync.
    Unchanged,
    Synced { added: usize, evicted: usize },
}

pub struct MockStore {
    objects: HashMap<Guid, MockObject>,
    /// Registration order matters for `create` fallback.
    datasources: Vec<DatasourceState>,
    entity_module: String,
    identity_key: Option<String>,
}

impl MockStore {
    pub fn new(entity_module: impl Into<String>, identity_key: Option<String>) -> Self {
        Self {
            objects: HashMap::new(),
            datasources: Vec::new(),
            entity_module: entity_module.into(),
            identity_key,
        }
    }

    pub fn entity_name(&self, key: &str) -> String {
        format!("{}.{}", self.entity_module, key)
    }

    /// Register a datasource key without syncing it. Idempotent.
    pub fn register(&mut self, key: &str) -> usize {
        if let Some(idx) = self.datasources.iter().position(|d| d.key == key) {
            return idx;
        }
        let entity = self.entity_name(key);
        self.datasources.push(DatasourceState::new(key, entity));
        self.datasources.len() - 1
    }

    pub fn datasource(&self, key: &str) -> Option<&DatasourceState> {
        self.datasources.iter().find(|d| d.key == key)
    }

    pub fn datasource_keys(&self) -> Vec<String> {
        self.datasources.iter().map(|d| d.key.clone()).collect()
    }

    pub fn object(&self, guid: &str) -> Result<&MockObject, MockDataError> {
        self.objects.get(guid).ok_or_else(|| MockDataError::ObjectNotFound {
            guid: guid.to_string(),
        })
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.objects.contains_key(guid)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Live items of a datasource, in order.
    pub fn items(&self, key: &str) -> Vec<&MockObject> {
        self.datasource(key)
            .map(|ds| ds.live.iter().filter_map(|g| self.objects.get(g)).collect())
            .unwrap_or_default()
    }

    /// Committed records of a datasource's live items.
    pub fn serialize_items(&self, key: &str) -> Vec<Value> {
        self.items(key)
            .into_iter()
            .map(|o| Value::Object(o.data.clone()))
            .collect()
    }

    /// Re-synchronize `key` against its backing JSON text.
    pub fn sync_datasource(
        &mut self,
        key: &str,
        source: Option<&str>,
    ) -> Result<SyncOutcome, MockDataError> {
        let idx = self.register(key);
        let ds = &mut self.datasources[idx];
        let objects = &mut self.objects;

        if ds.synced && ds.last_source.as_deref() == source {
            return Ok(SyncOutcome::Unchanged);
        }
        ds.synced = true;
        ds.last_source = source.map(str::to_string);

        let records = match parse_records(source) {
            Ok(records) => records,
            Err(reason) => {
                ds.status = DatasourceStatus::Unavailable;
                return Err(MockDataError::MalformedDatasource {
                    key: key.to_string(),
                    reason,
                });
            }
        };

        if let Some(first) = records.first() {
            for (attr, value) in first {
                ds.schema.entry(attr.clone()).or_insert(AttributeInfo {
                    attribute_type: AttributeType::infer(value),
                });
            }
        }

        let identity_key = self.identity_key.clone();
        let natural_keys = identity_key
            .as_deref()
            .and_then(|field| natural_keys(&records, field));

        let mut live: Vec<Guid> = Vec::with_capacity(records.len());
        let mut present: HashSet<Guid> = HashSet::new();
        let mut added = 0;

        for (i, record) in records.into_iter().enumerate() {
            let reuse = match (&natural_keys, identity_key.as_deref()) {
                (Some(keys), Some(field)) => ds
                    .keyed
                    .get(&keys[i])
                    .cloned()
                    .filter(|g| objects.contains_key(g) && !present.contains(g))
                    .or_else(|| {
                        // Bundle-created object whose key was assigned after creation.
                        ds.live
                            .iter()
                            .find(|g| {
                                !present.contains(*g)
                                    && objects.get(*g).is_some_and(|o| {
                                        o.dynamic && natural_key(&o.data, field).as_ref() == Some(&keys[i])
                                    })
                            })
                            .cloned()
                    }),
                _ => ds.slots.get(i).cloned(),
            }
            .filter(|g| objects.contains_key(g) && !present.contains(g));

            let guid = match reuse {
                Some(guid) => {
                    if let Some(object) = objects.get_mut(&guid) {
                        object.data = record;
                        object.changes.clear();
                        object.is_new = false;
                    }
                    guid
                }
                None => {
                    let guid = new_guid();
                    objects.insert(
                        guid.clone(),
                        MockObject {
                            guid: guid.clone(),
                            entity: ds.entity.clone(),
                            datasource_key: ds.key.clone(),
                            data: record,
                            changes: Map::new(),
                            is_new: false,
                            dynamic: false,
                        },
                    );
                    added += 1;
                    guid
                }
            };

            if let Some(ref keys) = natural_keys {
                ds.keyed.insert(keys[i].clone(), guid.clone());
            }
            ds.misses.remove(&guid);
            present.insert(guid.clone());
            live.push(guid);
        }

        // Previously known guids that this parse did not produce.
        let mut absent: Vec<Guid> = Vec::new();
        for guid in ds.live.iter().chain(ds.misses.keys()) {
            if !present.contains(guid) && !absent.contains(guid) {
                absent.push(guid.clone());
            }
        }

        let mut evicted = 0;
        for guid in absent {
            let dynamic = objects.get(&guid).map(|o| o.dynamic).unwrap_or(false);
            if dynamic {
                live.push(guid.clone());
                present.insert(guid);
                continue;
            }
            let misses = ds.misses.entry(guid.clone()).or_insert(0);
            *misses += 1;
            if *misses >= EVICT_AFTER_MISSES {
                objects.remove(&guid);
                ds.forget(&guid);
                evicted += 1;
            }
        }

        let mut slots = live.clone();
        for guid in &ds.slots {
            if !present.contains(guid) && objects.contains_key(guid) {
                slots.push(guid.clone());
            }
        }

        ds.live = live;
        ds.slots = slots;
        ds.status = DatasourceStatus::Available;
        Ok(SyncOutcome::Synced { added, evicted })
    }

    /// Create an empty object for `entity`. Falls back to the first registered datasource.
    /// Returns the new guid and the datasource key it joined.
    pub fn create(&mut self, entity: &str) -> Result<(Guid, String), MockDataError> {
        let idx = self
            .datasources
            .iter()
            .position(|d| d.entity == entity)
            .or(if self.datasources.is_empty() { None } else { Some(0) })
            .ok_or_else(|| MockDataError::UnknownEntity {
                entity: entity.to_string(),
            })?;

        let ds = &mut self.datasources[idx];
        let data: Map<String, Value> = ds
            .schema
            .iter()
            .map(|(attr, info)| (attr.clone(), info.attribute_type.default_value()))
            .collect();

        let guid = new_guid();
        self.objects.insert(
            guid.clone(),
            MockObject {
                guid: guid.clone(),
                entity: ds.entity.clone(),
                datasource_key: ds.key.clone(),
                data,
                changes: Map::new(),
                is_new: true,
                dynamic: true,
            },
        );
        if let Some(key) = self
            .identity_key
            .as_deref()
            .and_then(|field| self.objects.get(&guid).and_then(|o| natural_key(&o.data, field)))
        {
            ds.keyed.entry(key).or_insert_with(|| guid.clone());
        }
        ds.live.push(guid.clone());
        ds.slots.insert(ds.live.len() - 1, guid.clone());
        Ok((guid, ds.key.clone()))
    }

    /// Stage an attribute change.
    pub fn set_attribute(&mut self, guid: &str, attr: &str, value: Value) -> Result<(), MockDataError> {
        let object = self
            .objects
            .get_mut(guid)
            .ok_or_else(|| MockDataError::ObjectNotFound {
                guid: guid.to_string(),
            })?;
        object.changes.insert(attr.to_string(), value);
        Ok(())
    }

    /// Write staged changes into the live item. Returns the affected datasource key.
    pub fn commit(&mut self, guid: &str) -> Result<String, MockDataError> {
        let object = self
            .objects
            .get_mut(guid)
            .ok_or_else(|| MockDataError::ObjectNotFound {
                guid: guid.to_string(),
            })?;
        let changes = std::mem::take(&mut object.changes);
        object.data.extend(changes);
        object.is_new = false;

        let key = object.datasource_key.clone();
        let natural = self
            .identity_key
            .as_deref()
            .and_then(|field| natural_key(&object.data, field));
        if let Some(ds) = self.datasources.iter_mut().find(|d| d.key == key) {
            for (attr, value) in &object.data {
                ds.schema.entry(attr.clone()).or_insert(AttributeInfo {
                    attribute_type: AttributeType::infer(value),
                });
            }
            // The committed key now names this object.
            if let Some(natural) = natural {
                ds.keyed.retain(|_, g| g != guid);
                ds.keyed.insert(natural, guid.to_string());
            }
        }
        Ok(key)
    }

    /// Delete an object. Returns the affected datasource key.
    pub fn remove(&mut self, guid: &str) -> Result<String, MockDataError> {
        let object = self
            .objects
            .remove(guid)
            .ok_or_else(|| MockDataError::ObjectNotFound {
                guid: guid.to_string(),
            })?;
        if let Some(ds) = self
            .datasources
            .iter_mut()
            .find(|d| d.key == object.datasource_key)
        {
            ds.forget(guid);
        }
        Ok(object.datasource_key)
    }
}

fn new_guid() -> Guid {
    Uuid::new_v4().simple().to_string()
}

fn parse_records(source: Option<&str>) -> Result<Vec<Map<String, Value>>, String> {
    let text = match source {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Ok(Vec::new()),
    };
    match serde_json::from_str::<Value>(text).map_err(|e| e.to_string())? {
        Value::Array(entries) => entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                Value::Object(map) => Ok(map),
                _ => Err(format!("item {} is not an object", i)),
            })
            .collect(),
        _ => Err("expected a JSON array".to_string()),
    }
}

/// Natural keys for every record, or `None` when any record lacks a unique scalar key.
/// Scalar value of `field` as an identity key.
fn natural_key(record: &Map<String, Value>, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn natural_keys(records: &[Map<String, Value>], field: &str) -> Option<Vec<String>> {
    let keys = records
        .iter()
        .map(|r| natural_key(r, field))
        .collect::<Option<Vec<String>>>()?;
    let unique: HashSet<&String> = keys.iter().collect();
    (unique.len() == keys.len()).then_some(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> MockStore {
        MockStore::new("Preview", Some("id".to_string()))
    }

    fn guids(store: &MockStore, key: &str) -> Vec<Guid> {
        store.datasource(key).unwrap().item_guids().to_vec()
    }

    #[test]
    fn test_identity_stable_across_equal_resync() {
        let mut s = store();
        s.sync_datasource("ds", Some(r#"[{"name":"a"},{"name":"b"}]"#)).unwrap();
        let first = guids(&s, "ds");

        // Same structure, different text.
        let outcome = s
            .sync_datasource("ds", Some(r#"[ {"name": "a"}, {"name": "b"} ]"#))
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { added: 0, evicted: 0 });
        assert_eq!(guids(&s, "ds"), first);
    }

    #[test]
    fn test_identical_text_is_unchanged() {
        let mut s = store();
        let text = r#"[{"name":"a"}]"#;
        s.sync_datasource("ds", Some(text)).unwrap();
        assert_eq!(s.sync_datasource("ds", Some(text)).unwrap(), SyncOutcome::Unchanged);
    }

    #[test]
    fn test_round_trip_of_records() {
        let mut s = store();
        let text = r#"[{"name":"a","age":3,"tags":["x"]},{"name":"b","age":4.5,"ok":true}]"#;
        s.sync_datasource("ds", Some(text)).unwrap();
        let original: Value = serde_json::from_str(text).unwrap();
        assert_eq!(Value::Array(s.serialize_items("ds")), original);
    }

    #[test]
    fn test_schema_from_first_item_and_grows() {
        let mut s = store();
        s.sync_datasource("ds", Some(r#"[{"name":"a"},{"name":"b"}]"#)).unwrap();
        let schema = serde_json::to_value(&s.datasource("ds").unwrap().schema).unwrap();
        assert_eq!(schema, json!({"name": {"type": "String"}}));

        s.sync_datasource("ds", Some(r#"[{"age":1}]"#)).unwrap();
        let schema = &s.datasource("ds").unwrap().schema;
        assert_eq!(schema.len(), 2);
        assert_eq!(schema["age"].attribute_type, AttributeType::Integer);
        assert_eq!(schema["name"].attribute_type, AttributeType::String);
    }

    #[test]
    fn test_natural_key_follows_reorder() {
        let mut s = store();
        s.sync_datasource("ds", Some(r#"[{"id":1,"n":"a"},{"id":2,"n":"b"}]"#)).unwrap();
        let before = guids(&s, "ds");
        s.sync_datasource("ds", Some(r#"[{"id":2,"n":"b"},{"id":1,"n":"a"}]"#)).unwrap();
        let after = guids(&s, "ds");
        assert_eq!(after, vec![before[1].clone(), before[0].clone()]);
    }

    #[test]
    fn test_index_identity_without_natural_key() {
        let mut s = MockStore::new("Preview", None);
        s.sync_datasource("ds", Some(r#"[{"id":1},{"id":2}]"#)).unwrap();
        let before = guids(&s, "ds");
        s.sync_datasource("ds", Some(r#"[{"id":2},{"id":1}]"#)).unwrap();
        assert_eq!(guids(&s, "ds"), before);
        assert_eq!(s.object(&before[0]).unwrap().data["id"], json!(2));
    }

    #[test]
    fn test_eviction_after_two_missed_syncs() {
        let mut s = MockStore::new("Preview", None);
        s.sync_datasource("ds", Some(r#"[{"n":"a"},{"n":"b"}]"#)).unwrap();
        let dropped = guids(&s, "ds")[1].clone();

        let outcome = s.sync_datasource("ds", Some(r#"[{"n":"a"}]"#)).unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { added: 0, evicted: 0 });
        assert!(s.contains(&dropped));
        assert_eq!(guids(&s, "ds").len(), 1);

        let outcome = s.sync_datasource("ds", Some(r#"[{"n":"a2"}]"#)).unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { added: 0, evicted: 1 });
        assert!(!s.contains(&dropped));
    }

    #[test]
    fn test_regrow_within_grace_reuses_guid() {
        let mut s = MockStore::new("Preview", None);
        s.sync_datasource("ds", Some(r#"[{"n":"a"},{"n":"b"}]"#)).unwrap();
        let before = guids(&s, "ds");
        s.sync_datasource("ds", Some(r#"[{"n":"a"}]"#)).unwrap();
        s.sync_datasource("ds", Some(r#"[{"n":"a"},{"n":"b"}]"#)).unwrap();
        assert_eq!(guids(&s, "ds"), before);
    }

    #[test]
    fn test_create_uses_schema_defaults_and_fallback() {
        let mut s = store();
        s.sync_datasource("ds", Some(r#"[{"name":"a","count":2,"ok":true}]"#)).unwrap();

        let (guid, key) = s.create("Preview.ds").unwrap();
        assert_eq!(key, "ds");
        let obj = s.object(&guid).unwrap();
        assert!(obj.is_new && obj.dynamic);
        assert_eq!(Value::Object(obj.data.clone()), json!({"count": 0, "name": "", "ok": false}));
        assert_eq!(s.items("ds").len(), 2);

        let (_, key) = s.create("Other.entity").unwrap();
        assert_eq!(key, "ds");
    }

    #[test]
    fn test_create_without_datasource_fails() {
        let mut s = store();
        assert_eq!(
            s.create("Preview.ds"),
            Err(MockDataError::UnknownEntity { entity: "Preview.ds".into() })
        );
    }

    #[test]
    fn test_commit_writes_staged_changes() {
        let mut s = store();
        s.sync_datasource("ds", Some(r#"[{"name":"a"}]"#)).unwrap();
        let guid = guids(&s, "ds")[0].clone();

        s.set_attribute(&guid, "name", json!("z")).unwrap();
        assert_eq!(s.serialize_items("ds"), vec![json!({"name": "a"})]);
        assert_eq!(s.object(&guid).unwrap().get("name"), Some(&json!("z")));

        assert_eq!(s.commit(&guid).unwrap(), "ds");
        assert_eq!(s.serialize_items("ds"), vec![json!({"name": "z"})]);
        assert!(s.object(&guid).unwrap().changes.is_empty());
    }

    #[test]
    fn test_remove_and_missing_object() {
        let mut s = store();
        s.sync_datasource("ds", Some(r#"[{"name":"a"},{"name":"b"}]"#)).unwrap();
        let guid = guids(&s, "ds")[0].clone();
        assert_eq!(s.remove(&guid).unwrap(), "ds");
        assert_eq!(s.serialize_items("ds"), vec![json!({"name": "b"})]);
        assert_eq!(
            s.remove(&guid),
            Err(MockDataError::ObjectNotFound { guid: guid.clone() })
        );
        assert!(s.commit(&guid).is_err());
    }

    #[test]
    fn test_dynamic_objects_survive_resync_until_removed() {
        let mut s = MockStore::new("Preview", None);
        s.sync_datasource("ds", Some(r#"[{"name":"a"}]"#)).unwrap();
        let (created, _) = s.create("Preview.ds").unwrap();

        s.sync_datasource("ds", Some(r#"[{"name":"a2"}]"#)).unwrap();
        s.sync_datasource("ds", Some(r#"[{"name":"a3"}]"#)).unwrap();
        assert!(s.contains(&created));
        assert_eq!(guids(&s, "ds")[1], created);

        // Caller merged the commit back: index 1 now maps onto the created object.
        s.sync_datasource("ds", Some(r#"[{"name":"a3"},{"name":"c"}]"#)).unwrap();
        assert_eq!(guids(&s, "ds"), vec![guids(&s, "ds")[0].clone(), created.clone()]);
        assert_eq!(s.object(&created).unwrap().data["name"], json!("c"));

        s.remove(&created).unwrap();
        assert!(!s.contains(&created));
    }

    #[test]
    fn test_malformed_json_keeps_previous_items() {
        let mut s = store();
        s.sync_datasource("ds", Some(r#"[{"name":"a"}]"#)).unwrap();
        let err = s.sync_datasource("ds", Some("[{")).unwrap_err();
        assert!(matches!(err, MockDataError::MalformedDatasource { .. }));
        let ds = s.datasource("ds").unwrap();
        assert_eq!(ds.status, DatasourceStatus::Unavailable);
        assert_eq!(ds.item_guids().len(), 1);

        assert!(s.sync_datasource("ds", Some(r#"{"name":"a"}"#)).is_err());
        assert!(s.sync_datasource("ds", Some(r#"[1]"#)).is_err());
    }

    #[test]
    fn test_empty_source_is_empty_list() {
        let mut s = store();
        s.sync_datasource("ds", None).unwrap();
        let ds = s.datasource("ds").unwrap();
        assert_eq!(ds.status, DatasourceStatus::Available);
        assert!(ds.item_guids().is_empty());
    }

    fn default_store() -> MockStore {
        let config = crate::config::SandboxConfig::default();
        MockStore::new(config.entity_module, config.identity_key)
    }

    /// Commit the created object, then sync its datasource from the committed list.
    fn merge_back(s: &mut MockStore, guid: &str) {
        let key = s.commit(guid).unwrap();
        let committed = Value::Array(s.serialize_items(&key)).to_string();
        s.sync_datasource(&key, Some(&committed)).unwrap();
    }

    #[test]
    fn test_created_object_with_assigned_id_merges_back_once() {
        let mut s = default_store();
        s.sync_datasource("ds", Some(r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#))
            .unwrap();
        let (guid, _) = s.create("Preview.ds").unwrap();
        s.set_attribute(&guid, "id", json!(3)).unwrap();
        s.set_attribute(&guid, "name", json!("c")).unwrap();
        merge_back(&mut s, &guid);

        assert_eq!(
            s.serialize_items("ds"),
            vec![
                json!({"id": 1, "name": "a"}),
                json!({"id": 2, "name": "b"}),
                json!({"id": 3, "name": "c"}),
            ]
        );
        assert_eq!(guids(&s, "ds")[2], guid);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_created_object_with_default_id_merges_back_once() {
        let mut s = default_store();
        s.sync_datasource("ds", Some(r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#))
            .unwrap();
        let (guid, _) = s.create("Preview.ds").unwrap();
        s.set_attribute(&guid, "name", json!("c")).unwrap();
        merge_back(&mut s, &guid);

        assert_eq!(s.items("ds").len(), 3);
        assert_eq!(guids(&s, "ds")[2], guid);
        assert_eq!(s.object(&guid).unwrap().get("name"), Some(&json!("c")));

        // A later commit still carries each record once.
        let again = Value::Array(s.serialize_items("ds")).to_string();
        s.sync_datasource("ds", Some(&again)).unwrap();
        assert_eq!(s.serialize_items("ds").len(), 3);
    }
}
