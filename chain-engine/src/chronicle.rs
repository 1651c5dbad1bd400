//! Chronicler (section 3): the append-only per-context buffer of log
//! lines and events, drained into the receipt on success and discarded
//! on failure.
//!
//! Grounded on the teacher's accumulation of `ExecutionEvent`s on the
//! `CallManager` during a message send (`fvm/src/call_manager/default.rs`,
//! the `events` field flushed into `ApplyRet` only once the top-level
//! call returns successfully) — the same "accumulate, then flush once at
//! the boundary" shape, generalized to also carry plain log lines.

use chain_types::Event;

/// One entry in the chronicle: a log line, or a structured event,
/// optionally tagged with the transaction it was emitted under (so a
/// block-level chronicler can later attribute entries back to the
/// transaction that produced them).
enum Entry {
    Log { transaction_index: Option<u32>, line: String },
    Event { transaction_index: Option<u32>, event: Event },
}

#[derive(Default)]
pub struct Chronicler {
    entries: Vec<Entry>,
}

impl Chronicler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, transaction_index: Option<u32>, line: impl Into<String>) {
        self.entries.push(Entry::Log {
            transaction_index,
            line: line.into(),
        });
    }

    pub fn emit(&mut self, transaction_index: Option<u32>, event: Event) {
        self.entries.push(Entry::Event {
            transaction_index,
            event,
        });
    }

    /// All log lines recorded so far, regardless of which transaction
    /// produced them, in emission order.
    pub fn logs(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Log { line, .. } => Some(line.clone()),
                Entry::Event { .. } => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Event { event, .. } => Some(event.clone()),
                Entry::Log { .. } => None,
            })
            .collect()
    }

    /// Log lines and events produced under a specific transaction index,
    /// used to populate that transaction's own receipt.
    pub fn logs_for(&self, transaction_index: u32) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Log { transaction_index: Some(i), line } if *i == transaction_index => {
                    Some(line.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn events_for(&self, transaction_index: u32) -> Vec<Event> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Event { transaction_index: Some(i), event } if *i == transaction_index => {
                    Some(event.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Discards every entry recorded for `transaction_index`, used when a
    /// transaction's effects are rolled back via its anonymous node
    /// (section 4.I step 7).
    pub fn discard_transaction(&mut self, transaction_index: u32) {
        self.entries
            .retain(|e| match e {
                Entry::Log { transaction_index: i, .. } | Entry::Event { transaction_index: i, .. } => {
                    *i != Some(transaction_index)
                }
            });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::Id;

    fn sample_event(name: &str) -> Event {
        Event {
            source: Id::zero(),
            name: name.to_string(),
            impacted_accounts: vec![],
            data: vec![],
        }
    }

    #[test]
    fn drains_logs_and_events_in_order() {
        let mut c = Chronicler::new();
        c.log(None, "first");
        c.emit(None, sample_event("a"));
        c.log(None, "second");
        assert_eq!(c.logs(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(c.events().len(), 1);
    }

    #[test]
    fn discarding_a_transaction_removes_only_its_entries() {
        let mut c = Chronicler::new();
        c.log(Some(0), "tx0 log");
        c.log(Some(1), "tx1 log");
        c.emit(Some(0), sample_event("x"));
        c.discard_transaction(0);
        assert_eq!(c.logs(), vec!["tx1 log".to_string()]);
        assert!(c.events().is_empty());
    }

    #[test]
    fn per_transaction_accessors_filter_correctly() {
        let mut c = Chronicler::new();
        c.log(Some(0), "a");
        c.log(Some(1), "b");
        assert_eq!(c.logs_for(0), vec!["a".to_string()]);
        assert_eq!(c.logs_for(1), vec!["b".to_string()]);
    }
}
