use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use reimburse_core::OrgId;

use super::{Record, Repository};
use crate::error::StoreError;

/// Repository operation, used to target injected failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    List,
    Insert,
    Update,
    Delete,
}

impl StoreOp {
    fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Get => "get_by_id",
            StoreOp::List => "list_by_filter",
            StoreOp::Insert => "insert",
            StoreOp::Update => "update",
            StoreOp::Delete => "delete",
        }
    }
}

#[derive(Debug)]
struct InjectedFailure<Id> {
    op: StoreOp,
    id: Option<Id>,
    error: StoreError,
    persistent: bool,
}

/// In-memory repository keyed by record id.
///
/// Intended for tests/dev. Supports failure injection and a simulated call
/// latency that is checked against the configured call timeout.
#[derive(Debug)]
pub struct InMemoryRepository<T: Record> {
    records: RwLock<BTreeMap<T::Id, T>>,
    failures: Mutex<Vec<InjectedFailure<T::Id>>>,
    call_timeout: Option<Duration>,
    simulated_latency: Duration,
}

impl<T: Record> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            failures: Mutex::new(Vec::new()),
            call_timeout: None,
            simulated_latency: Duration::ZERO,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Pretend every call takes `latency`; calls slower than the timeout fail.
    pub fn with_simulated_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = latency;
        self
    }

    /// Fail the next `op` call (any id) once with `error`.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.push_failure(op, None, error, false);
    }

    /// Fail every `op` call that targets `id` with `error`.
    pub fn fail_for(&self, op: StoreOp, id: T::Id, error: StoreError) {
        self.push_failure(op, Some(id), error, true);
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record across all orgs (test inspection).
    pub fn snapshot(&self) -> Vec<T> {
        self.records
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    fn push_failure(&self, op: StoreOp, id: Option<T::Id>, error: StoreError, persistent: bool) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(InjectedFailure {
                op,
                id,
                error,
                persistent,
            });
        }
    }

    fn check(&self, op: StoreOp, id: Option<&T::Id>) -> Result<(), StoreError> {
        if let Some(timeout) = self.call_timeout {
            if self.simulated_latency > timeout {
                return Err(StoreError::Timeout {
                    op: format!("{}.{}", T::KIND, op.as_str()),
                    after: timeout,
                });
            }
        }

        let mut failures = self
            .failures
            .lock()
            .map_err(|_| StoreError::backend("lock poisoned"))?;
        let hit = failures.iter().position(|f| {
            f.op == op && f.id.as_ref().is_none_or(|target| Some(target) == id)
        });
        match hit {
            Some(idx) if failures[idx].persistent => Err(failures[idx].error.clone()),
            Some(idx) => Err(failures.remove(idx).error),
            None => Ok(()),
        }
    }

    fn not_found(id: &T::Id) -> StoreError {
        StoreError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        }
    }
}

impl<T: Record> Repository<T> for InMemoryRepository<T> {
    fn get_by_id(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        self.check(StoreOp::Get, Some(id))?;
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))?;
        Ok(records.get(id).cloned())
    }

    fn list_by_filter(
        &self,
        org_id: OrgId,
        predicate: &dyn Fn(&T) -> bool,
    ) -> Result<Vec<T>, StoreError> {
        self.check(StoreOp::List, None)?;
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))?;
        Ok(records
            .values()
            .filter(|r| r.org_id() == org_id && predicate(r))
            .cloned()
            .collect())
    }

    fn insert(&self, record: T) -> Result<T, StoreError> {
        let id = *record.id();
        self.check(StoreOp::Insert, Some(&id))?;
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))?;
        if records.contains_key(&id) {
            return Err(StoreError::Duplicate {
                kind: T::KIND,
                id: id.to_string(),
            });
        }
        records.insert(id, record.clone());
        Ok(record)
    }

    fn update(&self, id: &T::Id, patch: T::Patch) -> Result<T, StoreError> {
        self.check(StoreOp::Update, Some(id))?;
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))?;
        let record = records.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        record.apply_patch(&patch);
        Ok(record.clone())
    }

    fn delete(&self, id: &T::Id) -> Result<(), StoreError> {
        self.check(StoreOp::Delete, Some(id))?;
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))?;
        records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use reimburse_core::{Money, PolicyId};
    use reimburse_expenses::Policy;

    fn policy(org_id: OrgId, expense_type: &str) -> Policy {
        Policy {
            id: PolicyId::new(),
            org_id,
            expense_type: expense_type.to_string(),
            per_unit_cost: None,
            upper_limit: Some(Money::major(100).unwrap()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn list_is_org_scoped() {
        let repo = InMemoryRepository::new();
        let org_a = OrgId::new();
        let org_b = OrgId::new();
        repo.insert(policy(org_a, "Travel")).unwrap();
        repo.insert(policy(org_b, "Travel")).unwrap();

        let listed = repo.list_by_filter(org_a, &|_| true).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].org_id, org_a);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let repo = InMemoryRepository::new();
        let p = policy(OrgId::new(), "Travel");
        repo.insert(p.clone()).unwrap();
        assert!(matches!(repo.insert(p), Err(StoreError::Duplicate { .. })));
    }

    #[test]
    fn one_shot_failure_fires_once() {
        let repo: InMemoryRepository<Policy> = InMemoryRepository::new();
        repo.fail_next(StoreOp::Insert, StoreError::backend("disk full"));
        assert!(repo.insert(policy(OrgId::new(), "Travel")).is_err());
        assert!(repo.insert(policy(OrgId::new(), "Travel")).is_ok());
    }

    #[test]
    fn targeted_failure_only_hits_its_id() {
        let repo = InMemoryRepository::new();
        let org = OrgId::new();
        let a = repo.insert(policy(org, "Travel")).unwrap();
        let b = repo.insert(policy(org, "Meals")).unwrap();
        repo.fail_for(StoreOp::Delete, a.id, StoreError::backend("locked"));
        assert!(repo.delete(&a.id).is_err());
        assert!(repo.delete(&a.id).is_err());
        assert!(repo.delete(&b.id).is_ok());
    }

    #[test]
    fn slow_backend_times_out() {
        let repo: InMemoryRepository<Policy> = InMemoryRepository::new()
            .with_call_timeout(Duration::from_millis(100))
            .with_simulated_latency(Duration::from_millis(250));
        match repo.get_by_id(&PolicyId::new()) {
            Err(StoreError::Timeout { op, .. }) => assert_eq!(op, "policy.get_by_id"),
            other => panic!("Expected timeout, got {other:?}"),
        }
    }
}
