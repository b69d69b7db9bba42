//! The model data: a keyed map of component id to opaque value, with
//! change-tracking hooks the scheduler uses to snapshot and replay state.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::component::ComponentId;

/// An opaque, cheaply-cloneable model value.
///
/// Values are type-erased at the model boundary; callers downcast via
/// [`Value::downcast_ref`] at the edges where they know the concrete type a
/// component is supposed to hold.
#[derive(Clone)]
pub struct Value(Rc<dyn Any>);

impl Value {
    /// Wraps a concrete value as an opaque model value.
    pub fn new<T: Any>(value: T) -> Self {
        Value(Rc::new(value))
    }

    /// Attempts to view the value as a `T`, returning `None` on a type
    /// mismatch.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Value(..)")
    }
}

/// A single reversible mutation: the component touched, its value before
/// the change, and its value after.
#[derive(Clone)]
pub(crate) struct Delta {
    pub(crate) id: ComponentId,
    pub(crate) old: Option<Value>,
    pub(crate) new: Option<Value>,
}

type Listener = Rc<dyn Fn(&HashSet<ComponentId>)>;

/// The shared, mutable model data.
///
/// `get`/`set`/`getOrCreate` are the surface a task closure is meant to use
/// (through [`TaskContext`], which also records deltas); `set_unchecked` is
/// the scheduler-only escape hatch used to install a value without going
/// through delta tracking, e.g. when transferring a predecessor's output to
/// a successor.
#[derive(Clone)]
pub struct ModelData {
    values: HashMap<ComponentId, Value>,
    listeners: Vec<Listener>,
}

impl ModelData {
    /// Creates an empty model.
    pub fn new() -> Self {
        ModelData {
            values: HashMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Returns the current value of `id`, or `None` if it was never set.
    pub fn get(&self, id: ComponentId) -> Option<&Value> {
        self.values.get(&id)
    }

    /// Replaces the value of `id`, returning its previous value.
    pub fn set(&mut self, id: ComponentId, value: Value) -> Option<Value> {
        self.values.insert(id, value)
    }

    /// Returns the existing value of `id`, installing `factory()` if absent.
    pub fn get_or_create(&mut self, id: ComponentId, factory: impl FnOnce() -> Value) -> Value {
        self.values.entry(id).or_insert_with(factory).clone()
    }

    /// Installs `value` (or clears the slot, if `None`) without emitting a
    /// change-tracked delta. Reserved for the scheduler's own bookkeeping.
    pub fn set_unchecked(&mut self, id: ComponentId, value: Option<Value>) {
        match value {
            Some(v) => {
                self.values.insert(id, v);
            }
            None => {
                self.values.remove(&id);
            }
        }
    }

    /// Registers a listener invoked after each task completes with the set
    /// of components it actually wrote.
    pub fn observe_changes(&mut self, listener: impl Fn(&HashSet<ComponentId>) + 'static) {
        self.listeners.push(Rc::new(listener));
    }

    pub(crate) fn notify(&self, written: &HashSet<ComponentId>) {
        if written.is_empty() {
            return;
        }
        for listener in &self.listeners {
            listener(written);
        }
    }
}

impl Default for ModelData {
    fn default() -> Self {
        Self::new()
    }
}

/// The view a task closure gets of the model: `get`/`set`/`get_or_create`
/// delegate to the underlying [`ModelData`] but also append a [`Delta`] to
/// a scratch log, so the scheduler can later undo (or faithfully redo) this
/// task's effect without re-running it.
pub struct TaskContext<'a> {
    model: &'a mut ModelData,
    written: &'a mut HashSet<ComponentId>,
    log: &'a mut Vec<Delta>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        model: &'a mut ModelData,
        written: &'a mut HashSet<ComponentId>,
        log: &'a mut Vec<Delta>,
    ) -> Self {
        TaskContext { model, written, log }
    }

    /// Returns the current value of `id`, or `None` if it was never set.
    pub fn get(&self, id: ComponentId) -> Option<&Value> {
        self.model.get(id)
    }

    /// Replaces the value of `id`, recording the reversible delta.
    pub fn set(&mut self, id: ComponentId, value: Value) {
        let old = self.model.set(id, value.clone());
        self.written.insert(id);
        self.log.push(Delta {
            id,
            old,
            new: Some(value),
        });
    }

    /// Returns the existing value of `id`, installing and recording
    /// `factory()` if absent.
    pub fn get_or_create(&mut self, id: ComponentId, factory: impl FnOnce() -> Value) -> Value {
        if let Some(existing) = self.model.get(id) {
            return existing.clone();
        }
        let value = factory();
        self.set(id, value.clone());
        value
    }
}
