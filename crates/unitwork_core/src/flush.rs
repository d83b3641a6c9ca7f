//! Flush coordination: dirty checking, draining and reconciling query
//! results with the identity map.

use crate::action::{ActionKind, ActionQueue, EntityAction};
use crate::config::{Config, FlushMode};
use crate::context::{DirtyChecker, PersistenceContext};
use crate::entity::{from_row, to_fields, Entity, EntityRef, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::stats::UnitStats;
use std::fmt;
use tracing::{debug, info, trace};
use unitwork_storage::{RecordKey, Row, StorageTransaction, Value};

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// `Session::flush` was called.
    Explicit,
    /// A direct query is about to run.
    BeforeQuery,
    /// The session is committing.
    Commit,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Explicit => "explicit",
            Self::BeforeQuery => "before-query",
            Self::Commit => "commit",
        })
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    executed: Vec<(ActionKind, RecordKey)>,
}

impl FlushReport {
    /// Executed actions in execution order.
    #[must_use]
    pub fn executed(&self) -> &[(ActionKind, RecordKey)] {
        &self.executed
    }

    /// Number of executed actions of one kind.
    #[must_use]
    pub fn count(&self, kind: ActionKind) -> usize {
        self.executed.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Returns true if the flush sent nothing to storage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }

    /// Number of executed actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executed.len()
    }
}

/// Decides when to flush and performs flushes for one session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlushCoordinator {
    mode: FlushMode,
    show_statements: bool,
}

impl FlushCoordinator {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            mode: config.flush_mode,
            show_statements: config.show_statements,
        }
    }

    /// Returns true if a direct query must be preceded by a flush.
    pub(crate) fn flushes_before_query(&self) -> bool {
        self.mode == FlushMode::Auto
    }

    pub(crate) fn shows_statements(&self) -> bool {
        self.show_statements
    }

    /// Enqueues an update for every managed entity that differs from its
    /// snapshot and advances the snapshot. Entities are visited in
    /// registration order; removed entities are skipped.
    pub(crate) fn schedule_updates(
        &self,
        context: &mut PersistenceContext,
        actions: &mut ActionQueue,
    ) -> CoreResult<usize> {
        let mut scheduled = 0;
        for key in context.managed_keys() {
            let (Some(instance), Some(entry)) = (context.instance(&key), context.entry(&key))
            else {
                continue;
            };
            let current = instance.read_fields()?;
            if !DirtyChecker::is_dirty(&entry.snapshot, &current) {
                continue;
            }
            if current
                .get(ID_FIELD)
                .is_some_and(|id| *id != Value::from(key.id))
            {
                return Err(CoreError::invalid_state(
                    key,
                    "the identifier of a managed entity changed",
                ));
            }
            let changed = DirtyChecker::check(&key, entry, &current)?;
            trace!(key = %key, changed = ?changed, "dirty");
            actions.enqueue(EntityAction::update(key.clone(), current.clone(), changed));
            context.refresh_snapshot(&key, current);
            scheduled += 1;
        }
        Ok(scheduled)
    }

    /// Flushes the session: schedules updates, drains the queue and forgets
    /// entities whose delete was executed.
    ///
    /// A flush with nothing to write performs no storage call. On a drain
    /// failure the error is returned with the queue partially drained.
    pub(crate) fn flush(
        &self,
        context: &mut PersistenceContext,
        actions: &mut ActionQueue,
        storage: &mut dyn StorageTransaction,
        stats: &UnitStats,
        trigger: FlushTrigger,
    ) -> CoreResult<FlushReport> {
        self.schedule_updates(context, actions)?;
        if actions.is_empty() {
            trace!(trigger = %trigger, "nothing to flush");
            return Ok(FlushReport::default());
        }

        debug!(
            trigger = %trigger,
            inserts = actions.count(ActionKind::Insert),
            updates = actions.count(ActionKind::Update),
            deletes = actions.count(ActionKind::Delete),
            "flushing"
        );
        stats.record_flush(trigger);

        let mut executed = Vec::new();
        let drained = actions.drain(storage, &mut executed);
        for action in &executed {
            if self.show_statements {
                info!(statement = %action, "executed");
            }
            stats.record_action(action.kind());
            if action.kind() == ActionKind::Delete {
                context.evict(action.key());
            }
        }
        drained?;
        debug!(trigger = %trigger, executed = executed.len(), "flushed");

        Ok(FlushReport {
            executed: executed
                .into_iter()
                .map(|action| (action.kind(), action.key().clone()))
                .collect(),
        })
    }

    /// Resolves query rows through the identity map.
    ///
    /// A row whose key is already tracked yields the tracked instance, never
    /// a fresh copy; other rows become newly managed instances with a
    /// snapshot of the loaded state.
    pub(crate) fn merge_rows<T: Entity>(
        &self,
        context: &mut PersistenceContext,
        rows: Vec<Row>,
        stats: &UnitStats,
    ) -> CoreResult<Vec<EntityRef<T>>> {
        let mut merged = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(instance) = context.instance(&row.key) {
                let handle = EntityRef::<T>::restore(&instance).ok_or_else(|| {
                    CoreError::invalid_operation(format!(
                        "{} is managed as a different entity type",
                        row.key
                    ))
                })?;
                stats.record_identity_hit();
                merged.push(handle);
                continue;
            }

            let entity: T = from_row(&row)?;
            let snapshot = to_fields(&entity)?;
            let handle = EntityRef::new(entity);
            context.manage(row.key, handle.erase(), snapshot)?;
            stats.record_load();
            merged.push(handle);
        }
        Ok(merged)
    }
}
