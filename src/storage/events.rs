//! Event log storage helpers.

use super::traits::{Filter, HasId, Storage};
use crate::domain::event::EventRecord;
use crate::error::Result;

/// Collection name for events.
pub const EVENTS_COLLECTION: &str = "events";

impl HasId for EventRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

pub struct EventStore<'a, S: Storage> {
    storage: &'a S,
}

impl<'a, S: Storage> EventStore<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    pub fn append(&self, event: &EventRecord) -> Result<()> {
        self.storage.create(EVENTS_COLLECTION, event)
    }

    pub fn list_all(&self) -> Result<Vec<EventRecord>> {
        self.storage.list(EVENTS_COLLECTION)
    }

    pub fn find_by_type(&self, event_type: &str) -> Result<Vec<EventRecord>> {
        self.storage
            .query(EVENTS_COLLECTION, &[Filter::eq("event_type", event_type)])
    }

    pub fn find_by_repository(&self, repository_id: &str) -> Result<Vec<EventRecord>> {
        self.storage
            .query(EVENTS_COLLECTION, &[Filter::eq("repository_id", repository_id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event_types;
    use crate::storage::JsonlStorage;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_filter() {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonlStorage::new(temp_dir.path()).unwrap();
        let store = EventStore::new(&storage);

        store.append(&EventRecord::error("repo-1", "job-1", "boom")).unwrap();
        store
            .append(&EventRecord::pr_created("repo-2", "a.ts", "https://example.test/pull/1"))
            .unwrap();

        assert_eq!(store.list_all().unwrap().len(), 2);
        assert_eq!(store.find_by_type(event_types::ERROR).unwrap().len(), 1);
        assert_eq!(store.find_by_repository("repo-2").unwrap().len(), 1);
    }
}
