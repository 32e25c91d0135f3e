//! Recording action and collaborators shared by the unit tests

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::queue::action::{Action, AfterCompletion, BeforeCompletion, Property};
use crate::queue::context::{EntityStatus, PersistenceContext, QueryCache, StorageBackend};
use crate::queue::key::{InstanceId, SortKey};
use crate::{QueueError, QueueResult};

/// Shared, ordered log of everything the test doubles observed
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestAction {
    pub entity: String,
    pub key: SortKey,
    pub instance: Option<InstanceId>,
    pub properties: Vec<Property>,
    pub spaces: Vec<String>,
    pub early: bool,
    pub vetoed: bool,
    pub owner: Option<InstanceId>,
    pub fail: bool,
    pub callbacks: bool,
    #[serde(skip)]
    pub journal: Journal,
}

impl TestAction {
    fn new(entity: &str, key: i64, instance: Option<u64>) -> Self {
        Self {
            entity: entity.to_string(),
            key: SortKey::Int(key),
            instance: instance.map(InstanceId),
            properties: Vec::new(),
            spaces: Vec::new(),
            early: false,
            vetoed: false,
            owner: None,
            fail: false,
            callbacks: false,
            journal: Journal::default(),
        }
    }

    pub fn insert(entity: &str, key: i64, instance: u64) -> Self {
        Self::new(entity, key, Some(instance))
    }

    pub fn delete(entity: &str, key: i64, instance: u64) -> Self {
        Self::new(entity, key, Some(instance))
    }

    pub fn update(entity: &str, key: i64) -> Self {
        Self::new(entity, key, None)
    }

    pub fn collection(role: &str, key: i64) -> Self {
        Self::new(role, key, None)
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_spaces(mut self, spaces: &[&str]) -> Self {
        self.spaces = spaces.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Arc::clone(journal);
        self
    }

    pub fn owned_by(mut self, owner: u64) -> Self {
        self.owner = Some(InstanceId(owner));
        self
    }

    pub fn early(mut self) -> Self {
        self.early = true;
        self
    }

    pub fn vetoed(mut self) -> Self {
        self.vetoed = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_callbacks(mut self) -> Self {
        self.callbacks = true;
        self
    }

    pub fn label(&self) -> String {
        format!("{}#{}", self.entity, self.key)
    }

    pub fn key_int(&self) -> i64 {
        match self.key {
            SortKey::Int(value) => value,
            _ => panic!("test action without integer key"),
        }
    }
}

impl Action for TestAction {
    fn entity_name(&self) -> &str {
        &self.entity
    }

    fn sort_key(&self) -> &SortKey {
        &self.key
    }

    fn affected_spaces(&self) -> &[String] {
        &self.spaces
    }

    fn execute(&mut self) -> QueueResult<()> {
        self.journal.lock().push(format!("execute:{}", self.label()));
        if self.fail {
            return Err(QueueError::ExecutionFailed {
                entity: self.entity.clone(),
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    fn before_commit_callback(&mut self) -> Option<BeforeCompletion> {
        if !self.callbacks {
            return None;
        }
        let journal = Arc::clone(&self.journal);
        let label = self.label();
        Some(Box::new(move || {
            journal.lock().push(format!("before:{label}"));
            Ok(())
        }))
    }

    fn after_commit_callback(&mut self) -> Option<AfterCompletion> {
        if !self.callbacks {
            return None;
        }
        let journal = Arc::clone(&self.journal);
        let label = self.label();
        Some(Box::new(move |success| {
            journal.lock().push(format!("after:{label}:{success}"));
            Ok(())
        }))
    }

    fn before_executions(&mut self) -> QueueResult<()> {
        self.journal.lock().push(format!("prepare:{}", self.label()));
        Ok(())
    }

    fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    fn properties(&self) -> &[Property] {
        &self.properties
    }

    fn affected_owner(&self) -> Option<InstanceId> {
        self.owner
    }

    fn is_early_insert(&self) -> bool {
        self.early
    }

    fn is_vetoed(&self) -> bool {
        self.vetoed
    }
}

/// Storage backend counting batch flushes
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub journal: Journal,
    pub fail: bool,
}

impl RecordingBackend {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: Arc::clone(journal),
            fail: false,
        }
    }

    pub fn flushes(&self) -> usize {
        self.journal.lock().iter().filter(|e| e.as_str() == "flush").count()
    }
}

impl StorageBackend for RecordingBackend {
    fn flush_pending_batch(&mut self) -> QueueResult<()> {
        self.journal.lock().push("flush".to_string());
        if self.fail {
            return Err(QueueError::Storage {
                operation: "flush_pending_batch".to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Query cache recording every (pre-)invalidation call
#[derive(Debug, Default)]
pub struct RecordingCache {
    pub pre_invalidated: Mutex<Vec<BTreeSet<String>>>,
    pub invalidated: Mutex<Vec<BTreeSet<String>>>,
    /// Pre-invalidation records the spaces and then fails
    pub fail_pre_invalidate: bool,
}

impl RecordingCache {
    pub fn failing() -> Self {
        Self {
            fail_pre_invalidate: true,
            ..Self::default()
        }
    }
}

impl QueryCache for RecordingCache {
    fn pre_invalidate(&self, spaces: &BTreeSet<String>) -> QueueResult<()> {
        self.pre_invalidated.lock().push(spaces.clone());
        if self.fail_pre_invalidate {
            return Err(QueueError::Cache {
                region: "timestamps".to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    fn invalidate(&self, spaces: &BTreeSet<String>) -> QueueResult<()> {
        self.invalidated.lock().push(spaces.clone());
        Ok(())
    }
}

/// Persistence context backed by explicit sets
#[derive(Debug, Default)]
pub struct TestContext {
    pub transient: HashSet<InstanceId>,
    pub statuses: HashMap<InstanceId, EntityStatus>,
}

impl TestContext {
    pub fn with_transient(mut self, ids: &[u64]) -> Self {
        self.transient.extend(ids.iter().copied().map(InstanceId));
        self
    }

    pub fn with_status(mut self, id: u64, status: EntityStatus) -> Self {
        self.statuses.insert(InstanceId(id), status);
        self
    }
}

impl PersistenceContext for TestContext {
    fn is_transient(&self, instance: InstanceId) -> bool {
        self.transient.contains(&instance)
    }

    fn status(&self, instance: InstanceId) -> Option<EntityStatus> {
        self.statuses.get(&instance).copied()
    }
}
