//! Session cache of projects and their chat summaries.
//!
//! Chat lists are fetched lazily the first time a project is expanded and
//! memoized for the rest of the session. Every mutation goes through one of the
//! helpers below so the cache stays the single source of truth for the view.

use std::collections::HashMap;

use jarvis_core::{Chat, ChatId, ChatSummary, Project, ProjectId};

use crate::transport::Backend;

/// Chat summaries of one project.
#[derive(Debug, Default, Clone)]
struct ChatBucket {
    chats: Vec<ChatSummary>,
    loaded: bool,
}

/// In-memory cache of projects and chat summaries.
///
/// Every known project has exactly one bucket; buckets of deleted projects are
/// evicted together with the project.
#[derive(Debug, Default)]
pub struct SessionCache {
    projects: Vec<Project>,
    buckets: HashMap<ProjectId, ChatBucket>,
}

impl SessionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// Projects in display order.
    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Look up a project.
    #[must_use]
    pub fn project(&self, project_id: ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    /// Replace the project list.
    ///
    /// Buckets of projects that are still present keep their chats; buckets of
    /// projects that disappeared are evicted.
    pub fn set_projects(&mut self, projects: Vec<Project>) {
        self.buckets
            .retain(|id, _| projects.iter().any(|p| p.id == *id));
        for project in &projects {
            self.buckets.entry(project.id).or_default();
        }
        self.projects = projects;
    }

    /// Fetch the project list.
    ///
    /// A failed fetch is logged and leaves the cache as it was, which on first
    /// load means an empty list.
    pub async fn load_projects(&mut self, backend: &dyn Backend) {
        match backend.list_projects().await {
            Ok(projects) => {
                tracing::debug!(count = projects.len(), "Loaded projects");
                self.set_projects(projects);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load projects");
            }
        }
    }

    /// Add a server-confirmed project with an empty, loaded bucket.
    pub fn add_project(&mut self, project: Project) {
        self.projects.retain(|p| p.id != project.id);
        self.buckets.insert(
            project.id,
            ChatBucket {
                chats: Vec::new(),
                loaded: true,
            },
        );
        self.projects.insert(0, project);
    }

    /// Remove a project and evict its bucket.
    ///
    /// Returns the ids of the chats that were cached under it.
    pub fn remove_project(&mut self, project_id: ProjectId) -> Vec<ChatId> {
        self.projects.retain(|p| p.id != project_id);
        self.buckets
            .remove(&project_id)
            .map(|bucket| bucket.chats.iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }

    /// Modify a cached project in place.
    ///
    /// Returns false if the project is unknown.
    pub fn update_project(&mut self, project_id: ProjectId, f: impl FnOnce(&mut Project)) -> bool {
        match self.projects.iter_mut().find(|p| p.id == project_id) {
            Some(project) => {
                f(project);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Chats
    // =========================================================================

    /// Cached chat summaries of a project; empty if not loaded or unknown.
    #[must_use]
    pub fn chats(&self, project_id: ProjectId) -> &[ChatSummary] {
        self.buckets
            .get(&project_id)
            .map(|bucket| bucket.chats.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the chat list of a project has been fetched.
    #[must_use]
    pub fn is_loaded(&self, project_id: ProjectId) -> bool {
        self.buckets.get(&project_id).is_some_and(|b| b.loaded)
    }

    /// Find a chat summary in any bucket.
    #[must_use]
    pub fn find_chat(&self, chat_id: ChatId) -> Option<&ChatSummary> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.chats.iter())
            .find(|c| c.id == chat_id)
    }

    /// Fetch the chat list of a project once.
    ///
    /// Returns true if a fetch was issued. Repeated calls for a loaded project do
    /// nothing. Chats already cached locally but missing from the server list are
    /// kept. A failed fetch is logged and leaves the bucket unloaded so a later
    /// expand retries.
    pub async fn load_project_chats(&mut self, backend: &dyn Backend, project_id: ProjectId) -> bool {
        match self.buckets.get(&project_id) {
            None => {
                tracing::warn!(project_id = %project_id, "Cannot load chats of unknown project");
                return false;
            }
            Some(bucket) if bucket.loaded => return false,
            Some(_) => {}
        }

        let fetched = match backend.list_chats(project_id).await {
            Ok(chats) => chats,
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "Failed to load chats");
                return true;
            }
        };

        // The project may have been removed while the fetch was pending.
        let Some(bucket) = self.buckets.get_mut(&project_id) else {
            return true;
        };
        let local_only: Vec<ChatSummary> = bucket
            .chats
            .drain(..)
            .filter(|local| !fetched.iter().any(|c| c.id == local.id))
            .collect();
        bucket.chats = local_only;
        bucket.chats.extend(fetched);
        bucket.loaded = true;

        tracing::debug!(project_id = %project_id, count = bucket.chats.len(), "Loaded chats");
        true
    }

    /// Add a server-confirmed chat at the top of its project's list.
    ///
    /// Any existing entry with the same id is removed first, wherever it is.
    pub fn add_chat(&mut self, chat: ChatSummary) {
        for bucket in self.buckets.values_mut() {
            bucket.chats.retain(|c| c.id != chat.id);
        }
        match self.buckets.get_mut(&chat.project_id) {
            Some(bucket) => bucket.chats.insert(0, chat),
            None => {
                tracing::warn!(
                    chat_id = %chat.id,
                    project_id = %chat.project_id,
                    "Dropping chat of unknown project"
                );
            }
        }
    }

    /// Remove a chat from whichever bucket holds it.
    ///
    /// Returns the removed summary.
    pub fn remove_chat(&mut self, chat_id: ChatId) -> Option<ChatSummary> {
        for bucket in self.buckets.values_mut() {
            if let Some(pos) = bucket.chats.iter().position(|c| c.id == chat_id) {
                return Some(bucket.chats.remove(pos));
            }
        }
        None
    }

    /// Set the title of a cached chat.
    ///
    /// Returns false if the chat is not cached.
    pub fn rename_chat(&mut self, chat_id: ChatId, title: &str) -> bool {
        let chat = self
            .buckets
            .values_mut()
            .flat_map(|bucket| bucket.chats.iter_mut())
            .find(|c| c.id == chat_id);
        match chat {
            Some(chat) => {
                chat.title = Some(title.to_string());
                true
            }
            None => false,
        }
    }

    /// Reconcile a hydrated chat with its cached summary.
    ///
    /// The summary is updated by id, never replaced wholesale. A chat that is not
    /// cached yet is added to its project's bucket if the project is known. The
    /// cached owning project wins over the one reported by the server.
    pub fn reconcile_chat(&mut self, chat: &Chat) {
        let cached = self
            .buckets
            .values_mut()
            .flat_map(|bucket| bucket.chats.iter_mut())
            .find(|c| c.id == chat.id);

        if let Some(summary) = cached {
            if summary.project_id != chat.project_id {
                tracing::warn!(
                    chat_id = %chat.id,
                    cached = %summary.project_id,
                    reported = %chat.project_id,
                    "Chat reported under a different project; keeping cached owner"
                );
            }
            summary.title.clone_from(&chat.title);
            if chat.created_at.is_some() {
                summary.created_at = chat.created_at;
            }
            return;
        }

        if let Some(bucket) = self.buckets.get_mut(&chat.project_id) {
            bucket.chats.insert(0, chat.summary());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn project(id: i64, name: &str) -> Project {
        Project {
            id: ProjectId::new(id),
            name: name.to_string(),
            description: String::new(),
            system_prompt: String::new(),
            created_at: None,
        }
    }

    fn summary(id: i64, project: i64, title: &str) -> ChatSummary {
        ChatSummary {
            id: ChatId::new(id),
            project_id: ProjectId::new(project),
            title: Some(title.to_string()),
            created_at: None,
        }
    }

    fn cache_with(projects: &[(i64, &str)]) -> SessionCache {
        let mut cache = SessionCache::new();
        cache.set_projects(projects.iter().map(|(id, name)| project(*id, name)).collect());
        cache
    }

    #[test]
    fn every_project_has_a_bucket() {
        let mut cache = cache_with(&[(1, "a"), (2, "b")]);
        assert!(cache.chats(ProjectId::new(1)).is_empty());
        assert!(!cache.is_loaded(ProjectId::new(1)));

        cache.set_projects(vec![project(2, "b")]);
        assert!(cache.project(ProjectId::new(1)).is_none());
        assert!(!cache.buckets.contains_key(&ProjectId::new(1)));
        assert!(cache.buckets.contains_key(&ProjectId::new(2)));
    }

    #[test]
    fn add_and_remove_project_manage_bucket() {
        let mut cache = SessionCache::new();
        cache.add_project(project(7, "Demo"));
        assert!(cache.is_loaded(ProjectId::new(7)));
        assert_eq!(cache.projects()[0].name, "Demo");

        cache.add_chat(summary(1, 7, "New Chat"));
        let removed = cache.remove_project(ProjectId::new(7));
        assert_eq!(removed, vec![ChatId::new(1)]);
        assert!(cache.projects().is_empty());
        assert!(cache.buckets.is_empty());
        assert!(cache.find_chat(ChatId::new(1)).is_none());
    }

    #[test]
    fn add_chat_never_duplicates_across_projects() {
        let mut cache = cache_with(&[(1, "a"), (2, "b")]);
        cache.add_chat(summary(10, 1, "x"));
        cache.add_chat(summary(10, 2, "x"));
        assert!(cache.chats(ProjectId::new(1)).is_empty());
        assert_eq!(cache.chats(ProjectId::new(2)).len(), 1);
    }

    #[test]
    fn remove_chat_scans_all_buckets() {
        let mut cache = cache_with(&[(1, "a"), (2, "b")]);
        cache.add_chat(summary(10, 1, "x"));
        cache.add_chat(summary(20, 2, "y"));

        let removed = cache.remove_chat(ChatId::new(20));
        assert_eq!(removed.map(|c| c.project_id), Some(ProjectId::new(2)));
        assert!(cache.chats(ProjectId::new(2)).is_empty());
        assert_eq!(cache.chats(ProjectId::new(1)).len(), 1);
        assert!(cache.remove_chat(ChatId::new(20)).is_none());
    }

    #[test]
    fn rename_updates_title_only() {
        let mut cache = cache_with(&[(1, "a")]);
        cache.add_chat(summary(10, 1, "old"));
        assert!(cache.rename_chat(ChatId::new(10), "new"));
        let chat = cache.find_chat(ChatId::new(10)).unwrap();
        assert_eq!(chat.title.as_deref(), Some("new"));
        assert_eq!(chat.project_id, ProjectId::new(1));
        assert!(!cache.rename_chat(ChatId::new(11), "nope"));
    }

    #[test]
    fn reconcile_keeps_cached_owner() {
        let mut cache = cache_with(&[(1, "a"), (2, "b")]);
        cache.add_chat(summary(10, 1, "old"));
        let hydrated = Chat {
            id: ChatId::new(10),
            project_id: ProjectId::new(2),
            title: Some("fresh".into()),
            created_at: None,
            messages: Vec::new(),
        };
        cache.reconcile_chat(&hydrated);

        assert_eq!(cache.chats(ProjectId::new(1))[0].title.as_deref(), Some("fresh"));
        assert!(cache.chats(ProjectId::new(2)).is_empty());
    }

    #[test]
    fn reconcile_inserts_missing_chat() {
        let mut cache = cache_with(&[(1, "a")]);
        let hydrated = Chat {
            id: ChatId::new(3),
            project_id: ProjectId::new(1),
            title: None,
            created_at: None,
            messages: Vec::new(),
        };
        cache.reconcile_chat(&hydrated);
        assert_eq!(cache.chats(ProjectId::new(1)).len(), 1);
    }

    #[tokio::test]
    async fn chat_list_is_fetched_once() {
        let backend = MockBackend::new();
        let project = backend.seed_project("Demo");
        backend.seed_chat(project.id, "first", Vec::new());

        let mut cache = SessionCache::new();
        cache.load_projects(&backend).await;

        assert!(cache.load_project_chats(&backend, project.id).await);
        assert!(!cache.load_project_chats(&backend, project.id).await);
        assert_eq!(backend.calls("list_chats"), 1);
        assert_eq!(cache.chats(project.id).len(), 1);
    }

    #[tokio::test]
    async fn failed_chat_load_retries_later() {
        let backend = MockBackend::new();
        let project = backend.seed_project("Demo");
        let mut cache = SessionCache::new();
        cache.load_projects(&backend).await;

        backend.fail("list_chats", 500);
        cache.load_project_chats(&backend, project.id).await;
        assert!(!cache.is_loaded(project.id));
        assert!(cache.chats(project.id).is_empty());

        backend.recover("list_chats");
        cache.load_project_chats(&backend, project.id).await;
        assert!(cache.is_loaded(project.id));
        assert_eq!(backend.calls("list_chats"), 2);
    }

    #[tokio::test]
    async fn load_keeps_local_only_chats() {
        let backend = MockBackend::new();
        let project = backend.seed_project("Demo");
        backend.seed_chat(project.id, "server", Vec::new());

        let mut cache = SessionCache::new();
        cache.load_projects(&backend).await;
        cache.add_chat(summary(99, project.id.get(), "local"));
        cache.load_project_chats(&backend, project.id).await;

        let titles: Vec<&str> = cache
            .chats(project.id)
            .iter()
            .map(ChatSummary::display_title)
            .collect();
        assert_eq!(titles, vec!["local", "server"]);
    }

    #[tokio::test]
    async fn failed_project_load_degrades_to_empty() {
        let backend = MockBackend::new();
        backend.seed_project("Demo");
        backend.fail("list_projects", 503);

        let mut cache = SessionCache::new();
        cache.load_projects(&backend).await;
        assert!(cache.projects().is_empty());
    }
}
