//! Repository-specific storage helpers.

use super::traits::{Filter, HasId, Storage};
use crate::domain::repository::{Repository, RepositoryStatus, parse_github_url};
use crate::error::Result;

/// Collection name for repositories.
pub const REPOSITORIES_COLLECTION: &str = "repositories";

impl HasId for Repository {
    fn id(&self) -> &str {
        &self.id
    }
}

pub struct RepositoryStore<'a, S: Storage> {
    storage: &'a S,
}

impl<'a, S: Storage> RepositoryStore<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    pub fn create(&self, repository: &Repository) -> Result<()> {
        self.storage.create(REPOSITORIES_COLLECTION, repository)
    }

    pub fn get(&self, id: &str) -> Result<Option<Repository>> {
        self.storage.get(REPOSITORIES_COLLECTION, id)
    }

    pub fn update(&self, repository: &Repository) -> Result<()> {
        self.storage.update(REPOSITORIES_COLLECTION, &repository.id, repository)
    }

    pub fn list_all(&self) -> Result<Vec<Repository>> {
        self.storage.list(REPOSITORIES_COLLECTION)
    }

    pub fn find_by_status(&self, status: RepositoryStatus) -> Result<Vec<Repository>> {
        self.storage
            .query(REPOSITORIES_COLLECTION, &[Filter::eq("status", status)])
    }

    /// Repositories eligible for a sweep: everything not mid-scan.
    pub fn find_sweepable(&self) -> Result<Vec<Repository>> {
        self.storage.query(
            REPOSITORIES_COLLECTION,
            &[Filter::ne("status", RepositoryStatus::Scanning)],
        )
    }

    /// Find a repository by `owner/name`, case-insensitively.
    pub fn find_by_coordinates(&self, owner: &str, name: &str) -> Result<Option<Repository>> {
        Ok(self.list_all()?.into_iter().find(|r| {
            r.owner.eq_ignore_ascii_case(owner) && r.name.eq_ignore_ascii_case(name)
        }))
    }

    /// Find a repository by its GitHub URL, comparing coordinates.
    pub fn find_by_url(&self, url: &str) -> Result<Option<Repository>> {
        let (owner, name) = parse_github_url(url)?;
        self.find_by_coordinates(&owner, &name)
    }
}
