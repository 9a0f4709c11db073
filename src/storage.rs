//! Shared variable storage
//!
//! One `VariableStore` instance is the canonical home for every
//! script-visible variable in the process. Runners are handed the store as
//! `Arc<VariableStore>`; `Arc::ptr_eq` against the synchronizer's copy is the
//! "already bound to the canonical store" test.
//!
//! Variables are split into three maps, one per value kind. A name lives in
//! at most one map at any time: the typed setters evict the name from the
//! other two kinds before inserting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A script-visible variable value
///
/// Names follow the script convention of a `$` prefix (e.g. `$affinity`);
/// the store treats names as opaque keys and does not enforce the prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Bulk snapshot of a store's contents, split by kind
///
/// Produced by [`VariableStore::get_all`] and consumed by
/// [`VariableStore::set_all`]. A snapshot is an independent clone; mutating
/// it never touches the store it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableSnapshot {
    pub numbers: HashMap<String, f64>,
    pub strings: HashMap<String, String>,
    pub bools: HashMap<String, bool>,
}

impl VariableSnapshot {
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty() && self.strings.is_empty() && self.bools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.numbers.len() + self.strings.len() + self.bools.len()
    }
}

#[derive(Debug, Default)]
struct Maps {
    numbers: HashMap<String, f64>,
    strings: HashMap<String, String>,
    bools: HashMap<String, bool>,
}

impl Maps {
    /// Remove `name` from every kind. Upholds the one-kind-per-name invariant
    /// ahead of an insert.
    fn evict(&mut self, name: &str) {
        self.numbers.remove(name);
        self.strings.remove(name);
        self.bools.remove(name);
    }
}

/// In-memory variable store shared by every dialogue runner
///
/// Pure data operations with no failure modes. The lock is held only for
/// non-awaiting critical sections; all mutation happens on the cooperative
/// scheduler the engine drives.
#[derive(Debug, Default)]
pub struct VariableStore {
    inner: RwLock<Maps>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Maps> {
        self.inner.read().expect("variable store lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Maps> {
        self.inner.write().expect("variable store lock poisoned")
    }

    /// Snapshot every variable in the store. No side effects.
    pub fn get_all(&self) -> VariableSnapshot {
        let maps = self.read();
        VariableSnapshot {
            numbers: maps.numbers.clone(),
            strings: maps.strings.clone(),
            bools: maps.bools.clone(),
        }
    }

    /// Bulk-write a snapshot into the store.
    ///
    /// With `clear` set, all three maps are replaced wholesale. Otherwise the
    /// snapshot is merged entry by entry: incoming values win on name
    /// collision, including collisions across kinds (the name is evicted from
    /// the other two maps first).
    pub fn set_all(&self, incoming: VariableSnapshot, clear: bool) {
        let mut maps = self.write();

        if clear {
            maps.numbers = incoming.numbers;
            maps.strings = incoming.strings;
            maps.bools = incoming.bools;
            return;
        }

        for (name, value) in incoming.numbers {
            maps.evict(&name);
            maps.numbers.insert(name, value);
        }
        for (name, value) in incoming.strings {
            maps.evict(&name);
            maps.strings.insert(name, value);
        }
        for (name, value) in incoming.bools {
            maps.evict(&name);
            maps.bools.insert(name, value);
        }
    }

    /// True if any of the three maps holds at least one variable.
    pub fn has_any_variables(&self) -> bool {
        let maps = self.read();
        !maps.numbers.is_empty() || !maps.strings.is_empty() || !maps.bools.is_empty()
    }

    /// Look up a variable by name, whichever kind it currently holds.
    pub fn get(&self, name: &str) -> Option<Value> {
        let maps = self.read();
        if let Some(n) = maps.numbers.get(name) {
            return Some(Value::Num(*n));
        }
        if let Some(s) = maps.strings.get(name) {
            return Some(Value::Str(s.clone()));
        }
        maps.bools.get(name).map(|b| Value::Bool(*b))
    }

    /// Set a variable, replacing any previous value of any kind.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        match value {
            Value::Num(n) => self.set_num(name, n),
            Value::Str(s) => self.set_str(name, s),
            Value::Bool(b) => self.set_bool(name, b),
        }
    }

    pub fn set_num(&self, name: impl Into<String>, value: f64) {
        let name = name.into();
        let mut maps = self.write();
        maps.evict(&name);
        maps.numbers.insert(name, value);
    }

    pub fn set_str(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let mut maps = self.write();
        maps.evict(&name);
        maps.strings.insert(name, value.into());
    }

    pub fn set_bool(&self, name: impl Into<String>, value: bool) {
        let name = name.into();
        let mut maps = self.write();
        maps.evict(&name);
        maps.bools.insert(name, value);
    }

    /// Total variable count across all kinds.
    pub fn len(&self) -> usize {
        let maps = self.read();
        maps.numbers.len() + maps.strings.len() + maps.bools.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_any_variables()
    }
}
