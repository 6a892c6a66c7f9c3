//! In-memory reference implementation of the store gateway.

use std::collections::BTreeMap;
use std::sync::Mutex;

use atoll_types::Timestamp;

use crate::row::{Assignment, Predicate, Row};
use crate::{CasOutcome, LinearizableStore, Result};

/// In-memory linearizable store for testing and simulation.
///
/// The single mutex is the linearization point: every `cas` evaluates its
/// predicate and applies its assignments under the same critical section.
/// A store-wide counter stamps the cells of each applied write, so stamps
/// are strictly monotonic across all tables.
///
/// Not suitable for production - data is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    counter: u64,
    tables: BTreeMap<String, BTreeMap<String, Row>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stamp of the most recent applied write.
    pub fn last_stamp(&self) -> Timestamp {
        Timestamp::new(self.inner.lock().expect("store mutex poisoned").counter)
    }
}

impl LinearizableStore for InMemoryStore {
    fn cas(
        &self,
        table: &str,
        key: &str,
        predicate: &Predicate,
        assignments: &[Assignment],
    ) -> Result<CasOutcome> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let observed = inner
            .tables
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
            .unwrap_or_default();

        if !predicate.holds(&observed) {
            return Ok(CasOutcome {
                applied: false,
                observed,
            });
        }

        inner.counter += 1;
        let written = Timestamp::new(inner.counter);

        let row = inner
            .tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();
        for assignment in assignments {
            match &assignment.value {
                Some(value) => row.put(assignment.field.clone(), value.clone(), written),
                None => row.clear(&assignment.field),
            }
        }

        Ok(CasOutcome {
            applied: true,
            observed,
        })
    }

    fn read_serial(&self, table: &str, key: &str) -> Result<Option<Row>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }

    fn remove(&self, table: &str, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.remove(key);
        }
        Ok(())
    }
}
