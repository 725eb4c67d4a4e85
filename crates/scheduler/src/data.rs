use std::any::Any;
use std::sync::Arc;

use hive_core::{AlgorithmNode, DataKey, EventContext, HiveError, HiveResult};
use hive_whiteboard::{downcast, ConditionStore, DataObject, Whiteboard};

use crate::task::AlgorithmError;

/// An algorithm's window onto one event's data.
///
/// Reads see the declared inputs of the slot (and objects this execution
/// already put). Writes are buffered and committed to the whiteboard only
/// after `execute` returns successfully, so a failing algorithm never
/// publishes partial results.
pub struct EventData<'a> {
    node: &'a AlgorithmNode,
    ctx: EventContext,
    whiteboard: &'a Whiteboard,
    conditions: &'a ConditionStore,
    outputs: Vec<(DataKey, DataObject)>,
}

impl<'a> EventData<'a> {
    pub fn new(
        node: &'a AlgorithmNode,
        ctx: EventContext,
        whiteboard: &'a Whiteboard,
        conditions: &'a ConditionStore,
    ) -> Self {
        Self {
            node,
            ctx,
            whiteboard,
            conditions,
            outputs: Vec::with_capacity(node.outputs.len()),
        }
    }

    /// A declared input of this event, or an object already put by this
    /// execution. Undeclared keys read as absent.
    pub fn get(&self, key: &DataKey) -> Option<DataObject> {
        if let Some((_, object)) = self.outputs.iter().find(|(k, _)| k == key) {
            return Some(Arc::clone(object));
        }
        if !self.node.consumes(key) {
            return None;
        }
        self.whiteboard.get(self.ctx.slot(), key)
    }

    pub fn get_as<T: Any + Send + Sync>(&self, key: &DataKey) -> Option<Arc<T>> {
        self.get(key).and_then(downcast::<T>)
    }

    /// Like [`get_as`](Self::get_as) but reports absence as an execution failure.
    pub fn require<T: Any + Send + Sync>(&self, key: &DataKey) -> Result<Arc<T>, AlgorithmError> {
        self.get_as::<T>(key).ok_or_else(|| {
            AlgorithmError::Failed(format!("input '{key}' missing or of unexpected type"))
        })
    }

    /// Produce `key` for this event.
    pub fn put<T: Any + Send + Sync>(&mut self, key: impl Into<DataKey>, value: T) -> HiveResult<()> {
        self.put_object(key.into(), Arc::new(value))
    }

    pub fn put_object(&mut self, key: DataKey, object: DataObject) -> HiveResult<()> {
        if !self.node.produces(&key) {
            return Err(HiveError::UndeclaredOutput {
                algorithm: self.node.name.clone(),
                key,
            });
        }
        if self.outputs.iter().any(|(k, _)| *k == key) {
            return Err(HiveError::DuplicateProduction {
                key,
                slot: self.ctx.slot(),
            });
        }
        self.outputs.push((key, object));
        Ok(())
    }

    /// Condition object valid for this event's number.
    pub fn condition(&self, key: &DataKey) -> Option<DataObject> {
        self.conditions.get(key, self.ctx.event_number())
    }

    pub fn condition_as<T: Any + Send + Sync>(&self, key: &DataKey) -> Option<Arc<T>> {
        self.conditions.get_as::<T>(key, self.ctx.event_number())
    }

    pub fn context(&self) -> &EventContext {
        &self.ctx
    }

    /// Check that every declared output was put, then write them all to
    /// the whiteboard.
    pub(crate) fn commit(self) -> Result<usize, AlgorithmError> {
        if let Some(missing) = self
            .node
            .outputs
            .iter()
            .find(|key| !self.outputs.iter().any(|(k, _)| k == *key))
        {
            return Err(AlgorithmError::MissingOutput(missing.clone()));
        }
        let count = self.outputs.len();
        for (key, object) in self.outputs {
            self.whiteboard.put(self.ctx.slot(), key, object)?;
        }
        Ok(count)
    }
}
