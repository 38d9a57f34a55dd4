//! Path to folder-id cache shared by every operation of one remote.
//!
//! Keys are paths relative to the remote root (`""` is the root itself).
//! A miss always goes back to the [`DirCacheSource`]; absence is never
//! cached.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{BackendError, Result};

/// Server lookups the cache falls back to on a miss.
#[async_trait]
pub trait DirCacheSource: Send + Sync {
    /// Returns the id of the folder `leaf` directly below `parent_id`.
    async fn find_leaf(&self, parent_id: &str, leaf: &str) -> Result<Option<String>>;

    /// Creates folder `leaf` below `parent_id` and returns its id.
    async fn create_dir(&self, parent_id: &str, leaf: &str) -> Result<String>;
}

#[derive(Debug, Default)]
struct State {
    root_id: Option<String>,
    paths: HashMap<String, String>,
}

#[derive(Debug)]
pub struct DirCache {
    root: String,
    true_root_id: String,
    state: Mutex<State>,
}

impl DirCache {
    /// `root` is the remote root path below the account root, whose id is
    /// `true_root_id`.
    pub fn new(root: &str, true_root_id: impl Into<String>) -> Self {
        Self {
            root: root.trim_matches('/').to_string(),
            true_root_id: true_root_id.into(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolved id of the remote root, if [`DirCache::find_root`] succeeded.
    pub fn root_id(&self) -> Option<String> {
        self.state().root_id.clone()
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.state().paths.get(path.trim_matches('/')).cloned()
    }

    pub fn put(&self, path: &str, id: impl Into<String>) {
        self.state()
            .paths
            .insert(path.trim_matches('/').to_string(), id.into());
    }

    /// Forgets `dir` and everything below it. Flushing the root forgets the
    /// resolved root too, so the next call walks again from the true root.
    pub fn flush_dir(&self, dir: &str) {
        let dir = dir.trim_matches('/');
        let mut state = self.state();
        if dir.is_empty() {
            state.paths.clear();
            state.root_id = None;
            return;
        }
        let prefix = format!("{dir}/");
        state
            .paths
            .retain(|path, _| path != dir && !path.starts_with(&prefix));
    }

    /// Resolves the remote root, creating missing folders when `create` is set.
    pub async fn find_root<S>(&self, source: &S, create: bool) -> Result<String>
    where
        S: DirCacheSource + ?Sized,
    {
        if let Some(id) = self.root_id() {
            return Ok(id);
        }
        let mut id = self.true_root_id.clone();
        for leaf in self.root.split('/').filter(|leaf| !leaf.is_empty()) {
            id = resolve_leaf(source, &id, leaf, create).await?;
        }
        let mut state = self.state();
        state.root_id = Some(id.clone());
        state.paths.insert(String::new(), id.clone());
        Ok(id)
    }

    /// Resolves `dir` (relative to the root) to a folder id, walking down
    /// from the deepest cached ancestor.
    pub async fn find_dir<S>(&self, source: &S, dir: &str, create: bool) -> Result<String>
    where
        S: DirCacheSource + ?Sized,
    {
        let dir = dir.trim_matches('/');
        let root_id = self.find_root(source, create).await?;
        if dir.is_empty() {
            return Ok(root_id);
        }
        if let Some(id) = self.get(dir) {
            return Ok(id);
        }

        let leaves: Vec<&str> = dir.split('/').collect();
        let (mut start, mut id) = (0, root_id);
        for depth in (1..leaves.len()).rev() {
            if let Some(cached) = self.get(&leaves[..depth].join("/")) {
                (start, id) = (depth, cached);
                break;
            }
        }
        for depth in start..leaves.len() {
            id = resolve_leaf(source, &id, leaves[depth], create).await?;
            self.put(&leaves[..=depth].join("/"), id.clone());
        }
        Ok(id)
    }

    /// Splits `path` into its leaf and the id of its parent folder.
    pub async fn find_path<S>(&self, source: &S, path: &str, create: bool) -> Result<(String, String)>
    where
        S: DirCacheSource + ?Sized,
    {
        let (parent, leaf) = split_path(path);
        let parent_id = self.find_dir(source, parent, create).await?;
        Ok((leaf.to_string(), parent_id))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn resolve_leaf<S>(source: &S, parent_id: &str, leaf: &str, create: bool) -> Result<String>
where
    S: DirCacheSource + ?Sized,
{
    if let Some(id) = source.find_leaf(parent_id, leaf).await? {
        return Ok(id);
    }
    if !create {
        return Err(BackendError::DirNotFound);
    }
    tracing::debug!(parent_id, leaf, "creating missing directory");
    source.create_dir(parent_id, leaf).await
}

/// Splits a relative path into `(parent, leaf)`; the parent of a top level
/// name is `""`.
pub fn split_path(path: &str) -> (&str, &str) {
    let path = path.trim_matches('/');
    match path.rsplit_once('/') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeSource {
        folders: Mutex<HashMap<(String, String), String>>,
        lookups: AtomicUsize,
        creates: AtomicUsize,
    }

    impl FakeSource {
        fn with(folders: &[(&str, &str, &str)]) -> Self {
            let source = Self::default();
            {
                let mut map = source.folders.lock().unwrap();
                for (parent, leaf, id) in folders {
                    map.insert((parent.to_string(), leaf.to_string()), id.to_string());
                }
            }
            source
        }
    }

    #[async_trait]
    impl DirCacheSource for FakeSource {
        async fn find_leaf(&self, parent_id: &str, leaf: &str) -> Result<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let folders = self.folders.lock().unwrap();
            Ok(folders
                .get(&(parent_id.to_string(), leaf.to_string()))
                .cloned())
        }

        async fn create_dir(&self, parent_id: &str, leaf: &str) -> Result<String> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            let id = format!("new{n}");
            self.folders
                .lock()
                .unwrap()
                .insert((parent_id.to_string(), leaf.to_string()), id.clone());
            Ok(id)
        }
    }

    #[test]
    fn split_path_separates_leaf() {
        assert_eq!(split_path("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(split_path("top"), ("", "top"));
        assert_eq!(split_path("/a/b/"), ("a", "b"));
        assert_eq!(split_path(""), ("", ""));
    }

    #[tokio::test]
    async fn empty_root_is_the_true_root() {
        let source = FakeSource::default();
        let cache = DirCache::new("", "");
        assert_eq!(cache.find_root(&source, false).await.unwrap(), "");
        assert_eq!(source.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cached_dirs_skip_lookups() {
        let source = FakeSource::with(&[("", "a", "1"), ("1", "b", "2")]);
        let cache = DirCache::new("", "");

        assert_eq!(cache.find_dir(&source, "a/b", false).await.unwrap(), "2");
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("a").as_deref(), Some("1"));

        assert_eq!(cache.find_dir(&source, "a/b", false).await.unwrap(), "2");
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn walks_from_deepest_cached_ancestor() {
        let source = FakeSource::with(&[("9", "c", "10")]);
        let cache = DirCache::new("", "");
        cache.find_root(&source, false).await.unwrap();
        cache.put("a/b", "9");

        assert_eq!(cache.find_dir(&source, "a/b/c", false).await.unwrap(), "10");
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_dir_is_not_found_and_not_cached() {
        let source = FakeSource::with(&[("", "a", "1")]);
        let cache = DirCache::new("", "");

        let err = cache.find_dir(&source, "a/missing", false).await.unwrap_err();
        assert!(matches!(err, BackendError::DirNotFound));
        assert_eq!(cache.get("a/missing"), None);

        cache.find_dir(&source, "a/missing", false).await.unwrap_err();
        assert_eq!(source.lookups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn create_makes_each_missing_component_once() {
        let source = FakeSource::with(&[("", "a", "1")]);
        let cache = DirCache::new("", "");

        let id = cache.find_dir(&source, "a/x/y", true).await.unwrap();
        assert_eq!(id, "new1");
        assert_eq!(cache.get("a/x").as_deref(), Some("new0"));
        assert_eq!(source.creates.load(Ordering::SeqCst), 2);

        cache.find_dir(&source, "a/x/y", true).await.unwrap();
        assert_eq!(source.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn root_below_account_root_is_resolved_once() {
        let source = FakeSource::with(&[("", "base", "5"), ("5", "sub", "6")]);
        let cache = DirCache::new("/base/sub/", "");

        assert_eq!(cache.root(), "base/sub");
        assert_eq!(cache.find_root(&source, false).await.unwrap(), "6");
        assert_eq!(cache.find_dir(&source, "", false).await.unwrap(), "6");
        assert_eq!(cache.root_id().as_deref(), Some("6"));
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn find_path_returns_leaf_and_parent() {
        let source = FakeSource::with(&[("", "dir", "3")]);
        let cache = DirCache::new("", "");
        let (leaf, parent) = cache.find_path(&source, "dir/file.txt", false).await.unwrap();
        assert_eq!(leaf, "file.txt");
        assert_eq!(parent, "3");
    }

    #[tokio::test]
    async fn flush_dir_drops_descendants_only() {
        let source = FakeSource::default();
        let cache = DirCache::new("", "");
        cache.find_root(&source, false).await.unwrap();
        cache.put("a", "1");
        cache.put("a/b", "2");
        cache.put("ab", "3");

        cache.flush_dir("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("a/b"), None);
        assert_eq!(cache.get("ab").as_deref(), Some("3"));

        cache.flush_dir("");
        assert_eq!(cache.get("ab"), None);
        assert_eq!(cache.root_id(), None);
    }
}
