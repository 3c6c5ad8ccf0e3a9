//! # Observable collections
//!
//! Presentation code holds these handles and watches them. Every publish swaps
//! in a whole new immutable snapshot, so an observer can never see a half
//! applied update. Mutators are crate-private and are only called from jobs
//! running on the [`UiContext`](crate::core::ui_context::UiContext).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

struct ListInner<T> {
    snapshot: watch::Sender<Arc<Vec<T>>>,
    revision: AtomicU64,
}

/// A collection populated asynchronously, possibly several times.
pub struct ObservableList<T> {
    inner: Arc<ListInner<T>>,
}

impl<T> Clone for ObservableList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObservableList<T> {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            inner: Arc::new(ListInner {
                snapshot,
                revision: AtomicU64::new(0),
            }),
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.inner.snapshot.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<T>>> {
        self.inner.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.inner.snapshot.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.snapshot.borrow().is_empty()
    }

    /// Number of publishes since creation.
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    /// True when both handles observe the same collection.
    pub fn same_collection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Replaces the whole contents.
    pub(crate) fn replace_all(&self, items: Vec<T>) {
        self.inner.snapshot.send_replace(Arc::new(items));
        self.inner.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl<T: Clone> ObservableList<T> {
    /// Copies the current contents, applies `edit`, publishes the result when
    /// `edit` reports a change.
    pub(crate) fn edit(&self, edit: impl FnOnce(&mut Vec<T>) -> bool) -> bool {
        let mut items = self.snapshot().as_ref().clone();
        let changed = edit(&mut items);
        if changed {
            self.replace_all(items);
        }
        changed
    }
}

/// A single value populated asynchronously.
pub struct ObservableValue<T> {
    value: Arc<watch::Sender<T>>,
}

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: Clone> ObservableValue<T> {
    pub fn new(initial: T) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            value: Arc::new(value),
        }
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.value.subscribe()
    }

    pub(crate) fn set(&self, value: T) {
        self.value.send_replace(value);
    }
}

#[cfg(test)]
mod tests {
    use super::{ObservableList, ObservableValue};
    use std::sync::Arc;

    #[test]
    fn replace_all_publishes_whole_snapshot() {
        let list = ObservableList::new();
        let rx = list.subscribe();
        list.replace_all(vec![1, 2, 3]);
        assert_eq!(*rx.borrow().as_ref(), vec![1, 2, 3]);
        assert_eq!(list.revision(), 1);
    }

    #[test]
    fn edit_without_change_keeps_snapshot_identity() {
        let list = ObservableList::new();
        list.replace_all(vec!["a".to_string()]);
        let before = list.snapshot();
        assert!(!list.edit(|_| false));
        assert!(Arc::ptr_eq(&before, &list.snapshot()));
        assert_eq!(list.revision(), 1);
    }

    #[test]
    fn clones_share_contents() {
        let list = ObservableList::new();
        let other = list.clone();
        list.replace_all(vec![7]);
        assert_eq!(other.len(), 1);
        assert!(list.same_collection(&other));
        assert!(!list.same_collection(&ObservableList::new()));
    }

    #[test]
    fn value_set_is_visible_to_subscribers() {
        let value = ObservableValue::new(None);
        let rx = value.subscribe();
        value.set(Some(5));
        assert_eq!(*rx.borrow(), Some(5));
        assert_eq!(value.get(), Some(5));
    }
}
