//! Tools panel models: todos and weather.
//!
//! Both follow the same fetch-mutate-render pattern as the chat lists: a
//! mutation is sent first and applied locally only once the backend confirms it.

use jarvis_core::{NewTodo, TodoItem, TodoPatch};

use crate::error::Result;
use crate::transport::Backend;

/// Todo items shown in the tools panel.
#[derive(Debug, Default, Clone)]
pub struct TodoList {
    items: Vec<TodoItem>,
}

impl TodoList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Items in server order.
    #[must_use]
    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Number of items not yet completed.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.items.iter().filter(|t| !t.completed).count()
    }

    /// Reload the list. A failed fetch empties it and logs a warning.
    pub async fn refresh(&mut self, backend: &dyn Backend) {
        match backend.list_todos().await {
            Ok(items) => self.items = items,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load todos");
                self.items.clear();
            }
        }
    }

    /// Add a todo. Blank text is ignored and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the backend rejects the item.
    pub async fn add(&mut self, backend: &dyn Backend, text: &str) -> Result<bool> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        let item = backend
            .add_todo(&NewTodo {
                text: text.to_string(),
            })
            .await?;
        self.items.push(item);
        Ok(true)
    }

    /// Key of the item at `index`. Items the backend stored without a key
    /// are shown but cannot be addressed.
    fn key_at(&self, index: usize) -> Option<String> {
        let item = self.items.get(index)?;
        if item.id.is_none() {
            tracing::warn!(index, text = %item.text, "Todo has no id; skipping mutation");
        }
        item.id.clone()
    }

    /// Flip the completion flag of the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the backend rejects the update.
    pub async fn toggle(&mut self, backend: &dyn Backend, index: usize) -> Result<()> {
        let Some(id) = self.key_at(index) else {
            return Ok(());
        };
        let patch = TodoPatch {
            text: None,
            completed: Some(!self.items[index].completed),
        };
        let updated = backend.update_todo(&id, &patch).await?;
        if let Some(slot) = self
            .items
            .iter_mut()
            .find(|t| t.id.as_deref() == Some(id.as_str()))
        {
            *slot = updated;
        }
        Ok(())
    }

    /// Delete the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the backend rejects the deletion.
    pub async fn remove(&mut self, backend: &dyn Backend, index: usize) -> Result<()> {
        let Some(id) = self.key_at(index) else {
            return Ok(());
        };
        backend.delete_todo(&id).await?;
        self.items.retain(|t| t.id.as_deref() != Some(id.as_str()));
        Ok(())
    }
}

/// Fetch the weather summary, or `None` if it is unavailable.
pub async fn fetch_weather(backend: &dyn Backend) -> Option<String> {
    match backend.weather().await {
        Ok(report) => Some(report.summary),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load weather");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[tokio::test]
    async fn add_toggle_remove() {
        let backend = MockBackend::new();
        let mut todos = TodoList::new();

        assert!(todos.add(&backend, "  buy milk ").await.unwrap());
        assert!(!todos.add(&backend, "   ").await.unwrap());
        assert_eq!(todos.items().len(), 1);
        assert_eq!(todos.items()[0].text, "buy milk");
        assert_eq!(todos.open_count(), 1);

        todos.toggle(&backend, 0).await.unwrap();
        assert!(todos.items()[0].completed);
        assert_eq!(todos.open_count(), 0);

        todos.remove(&backend, 0).await.unwrap();
        assert!(todos.items().is_empty());
        assert!(backend.todos().is_empty());
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_list_unchanged() {
        let backend = MockBackend::new();
        let mut todos = TodoList::new();
        todos.add(&backend, "walk").await.unwrap();

        backend.fail("update_todo", 500);
        assert!(todos.toggle(&backend, 0).await.is_err());
        assert!(!todos.items()[0].completed);
    }

    #[tokio::test]
    async fn keyless_items_load_but_are_not_mutated() {
        let backend = MockBackend::new();
        backend.seed_todo(None, "legacy");
        backend.seed_todo(Some("a1"), "walk");
        let mut todos = TodoList::new();
        todos.refresh(&backend).await;
        assert_eq!(todos.items().len(), 2);

        todos.toggle(&backend, 0).await.unwrap();
        todos.remove(&backend, 0).await.unwrap();
        assert_eq!(todos.items().len(), 2);
        assert_eq!(backend.calls("update_todo"), 0);
        assert_eq!(backend.calls("delete_todo"), 0);

        todos.toggle(&backend, 1).await.unwrap();
        assert!(todos.items()[1].completed);
    }

    #[tokio::test]
    async fn failed_refresh_degrades_to_empty() {
        let backend = MockBackend::new();
        let mut todos = TodoList::new();
        todos.add(&backend, "walk").await.unwrap();

        backend.fail("list_todos", 502);
        todos.refresh(&backend).await;
        assert!(todos.items().is_empty());
    }

    #[tokio::test]
    async fn weather_is_optional() {
        let backend = MockBackend::new();
        assert!(fetch_weather(&backend).await.is_some());
        backend.fail("weather", 500);
        assert_eq!(fetch_weather(&backend).await, None);
    }
}
