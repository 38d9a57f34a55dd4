use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use filejump_core::{Entry, FileJumpClient, FileJumpError, ItemType};
use time::OffsetDateTime;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Options;
use crate::dircache::{DirCache, DirCacheSource, split_path};
use crate::error::{BackendError, Result};
use crate::object::{Object, ObjectInfo};

/// Content handed to [`Fs::put`] and [`Object::update`].
pub type UploadReader = Box<dyn AsyncRead + Send + Sync + Unpin + 'static>;

/// Hash types a remote can report. FileJump supports none of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    Md5,
    Sha1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub can_have_empty_directories: bool,
    pub purge: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub remote: String,
    pub id: String,
    pub mod_time: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub enum DirEntry {
    Object(Object),
    Directory(Directory),
}

impl DirEntry {
    pub fn remote(&self) -> &str {
        match self {
            DirEntry::Object(object) => object.remote(),
            DirEntry::Directory(dir) => &dir.remote,
        }
    }
}

/// Operations a sync host drives on a configured remote.
#[async_trait]
pub trait Fs: Send + Sync + fmt::Display {
    fn name(&self) -> &str;
    fn root(&self) -> &str;
    fn precision(&self) -> Duration;
    fn hashes(&self) -> &'static [HashType];
    fn features(&self) -> Features;

    /// Children of `dir` in server order.
    async fn list(&self, dir: &str) -> Result<Vec<DirEntry>>;
    /// Looks up the file at `remote`.
    async fn new_object(&self, remote: &str) -> Result<Object>;
    /// Uploads `reader` to `src.remote`, creating parent directories.
    async fn put(&self, reader: UploadReader, src: &ObjectInfo) -> Result<Object>;
    async fn mkdir(&self, dir: &str) -> Result<()>;
    /// Removes an empty directory.
    async fn rmdir(&self, dir: &str) -> Result<()>;
    /// Removes a directory and everything in it.
    async fn purge(&self, dir: &str) -> Result<()>;
}

/// API access shared by the handle and its directory cache.
pub(crate) struct Api {
    pub(crate) client: FileJumpClient,
    pub(crate) options: Options,
}

impl Api {
    /// Visits every listed entry of a known type, with its name decoded.
    async fn list_all<F>(&self, dir_id: &str, mut visit: F) -> Result<bool>
    where
        F: FnMut(Entry) -> ControlFlow<()> + Send,
    {
        let encoding = self.options.encoding;
        let found = self
            .client
            .for_each_entry(dir_id, self.options.list_chunk, |mut entry| {
                if entry.item_type == ItemType::Unknown {
                    tracing::debug!(id = entry.id, name = %entry.name, "skipping entry of unknown type");
                    return ControlFlow::Continue(());
                }
                entry.name = encoding.to_standard_name(&entry.name);
                visit(entry)
            })
            .await?;
        Ok(found)
    }

    /// Finds the entry named exactly `leaf` inside `dir_id`.
    async fn find_entry(&self, dir_id: &str, leaf: &str) -> Result<Option<Entry>> {
        let mut found = None;
        self.list_all(dir_id, |entry| {
            if entry.name == leaf {
                found = Some(entry);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;
        Ok(found)
    }
}

#[async_trait]
impl DirCacheSource for Api {
    async fn find_leaf(&self, parent_id: &str, leaf: &str) -> Result<Option<String>> {
        let mut found = None;
        self.list_all(parent_id, |entry| {
            if entry.is_folder() && equal_fold(&entry.name, leaf) {
                found = Some(entry.id_string());
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;
        Ok(found)
    }

    async fn create_dir(&self, parent_id: &str, leaf: &str) -> Result<String> {
        let name = self.options.encoding.from_standard_name(leaf);
        let folder = self.client.create_folder(&name, parent_id).await?;
        Ok(folder.id.to_string())
    }
}

fn equal_fold(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

pub(crate) fn join_remote(dir: &str, leaf: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        leaf.to_string()
    } else {
        format!("{dir}/{leaf}")
    }
}

struct Inner {
    name: String,
    root: String,
    root_is_file: bool,
    api: Api,
    dir_cache: DirCache,
    span: tracing::Span,
}

/// A configured FileJump remote. Clones share the client and path cache.
#[derive(Clone)]
pub struct FileJumpFs {
    inner: Arc<Inner>,
}

impl FileJumpFs {
    pub async fn new(name: &str, root: &str, options: Options) -> Result<Self> {
        Self::with_cancellation(name, root, options, CancellationToken::new()).await
    }

    /// Like [`FileJumpFs::new`]; cancelling `cancel` aborts in-flight requests
    /// and backoff sleeps of every operation on the returned handle.
    pub async fn with_cancellation(
        name: &str,
        root: &str,
        options: Options,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let api = Api {
            client: options.build_client(cancel)?,
            options,
        };
        let root = root.trim_matches('/').to_string();
        let span = tracing::debug_span!("filejump", remote = %name);

        let mut dir_cache = DirCache::new(&root, "");
        let found = dir_cache.find_root(&api, false).instrument(span.clone()).await;
        let mut root_is_file = false;
        match found {
            Ok(_) => {}
            Err(BackendError::DirNotFound) => {
                let file_root = Self::file_root(&api, &root).instrument(span.clone()).await?;
                if let Some(parent_cache) = file_root {
                    tracing::debug!(parent: &span, root = %root, "root points to a file, using its parent");
                    dir_cache = parent_cache;
                    root_is_file = true;
                }
            }
            Err(err) => return Err(err),
        }
        let root = dir_cache.root().to_string();

        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                root,
                root_is_file,
                api,
                dir_cache,
                span,
            }),
        })
    }

    /// Checks whether `root` names an existing file; if so returns a cache
    /// rooted at its parent.
    async fn file_root(api: &Api, root: &str) -> Result<Option<DirCache>> {
        let (parent, leaf) = split_path(root);
        let parent_cache = DirCache::new(parent, "");
        let parent_id = match parent_cache.find_root(api, false).await {
            Ok(id) => id,
            Err(BackendError::DirNotFound) => return Ok(None),
            Err(err) => return Err(err),
        };
        match api.find_entry(&parent_id, leaf).await? {
            Some(entry) if !entry.is_folder() => Ok(Some(parent_cache)),
            _ => Ok(None),
        }
    }

    /// Set when the configured root named a file; the handle is then rooted
    /// at that file's parent.
    pub fn root_is_file(&self) -> bool {
        self.inner.root_is_file
    }

    pub fn options(&self) -> &Options {
        &self.inner.api.options
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.inner.api.client.pacer().cancellation()
    }

    pub(crate) fn client(&self) -> &FileJumpClient {
        &self.inner.api.client
    }

    pub(crate) fn span(&self) -> tracing::Span {
        self.inner.span.clone()
    }

    pub(crate) async fn find_dir(&self, dir: &str, create: bool) -> Result<String> {
        self.inner
            .dir_cache
            .find_dir(&self.inner.api, dir, create)
            .await
    }

    /// Leaf name and parent folder id of `remote`.
    pub(crate) async fn find_path(&self, remote: &str, create: bool) -> Result<(String, String)> {
        self.inner
            .dir_cache
            .find_path(&self.inner.api, remote, create)
            .await
    }

    /// Fetches the entry stored at `remote`.
    pub(crate) async fn read_entry(&self, remote: &str) -> Result<Entry> {
        let (leaf, dir_id) = match self.find_path(remote, false).await {
            Ok(found) => found,
            Err(BackendError::DirNotFound) => return Err(BackendError::ObjectNotFound),
            Err(err) => return Err(err),
        };
        match self.inner.api.find_entry(&dir_id, &leaf).await? {
            Some(entry) if entry.is_folder() => Err(BackendError::IsDir),
            Some(entry) => Ok(entry),
            None => Err(BackendError::ObjectNotFound),
        }
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let dir_id = self.find_dir(dir, false).await?;
        tracing::debug!(dir, %dir_id, "listing directory");
        let mut items = Vec::new();
        self.inner
            .api
            .list_all(&dir_id, |entry| {
                items.push(entry);
                ControlFlow::Continue(())
            })
            .await?;

        let mut entries = Vec::with_capacity(items.len());
        for entry in items {
            let remote = join_remote(dir, &entry.name);
            if entry.is_folder() {
                let id = entry.id_string();
                self.inner.dir_cache.put(&remote, id.clone());
                entries.push(DirEntry::Directory(Directory {
                    mod_time: entry.mod_time(),
                    remote,
                    id,
                }));
            } else {
                entries.push(DirEntry::Object(Object::from_entry(self.clone(), remote, entry)));
            }
        }
        Ok(entries)
    }

    async fn purge_check(&self, dir: &str, check: bool) -> Result<()> {
        let dir = dir.trim_matches('/');
        if join_remote(&self.inner.root, dir).is_empty() {
            return Err(BackendError::CantPurgeRoot);
        }
        let dir_id = self.find_dir(dir, false).await?;
        if check {
            // Unfiltered: children of unknown type still make the folder non-empty.
            let not_empty = self
                .client()
                .for_each_entry(&dir_id, self.inner.api.options.list_chunk, |_| {
                    ControlFlow::Break(())
                })
                .await?;
            if not_empty {
                return Err(BackendError::DirectoryNotEmpty);
            }
        }

        tracing::debug!(dir, %dir_id, "deleting directory");
        let result = self.client().delete_entries(&[&dir_id], true).await;
        match result {
            Ok(()) => {
                self.inner.dir_cache.flush_dir(dir);
                Ok(())
            }
            // The request went through but the API did not report success.
            // The path is evicted anyway and the failure is still returned.
            Err(err @ FileJumpError::Status { .. }) => {
                tracing::warn!(dir, error = %err, "directory delete not confirmed, evicting cache entry");
                self.inner.dir_cache.flush_dir(dir);
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl fmt::Display for FileJumpFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filejump root '{}'", self.inner.root)
    }
}

impl fmt::Debug for FileJumpFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileJumpFs")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("root_is_file", &self.inner.root_is_file)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Fs for FileJumpFs {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn root(&self) -> &str {
        &self.inner.root
    }

    fn precision(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn hashes(&self) -> &'static [HashType] {
        &[]
    }

    fn features(&self) -> Features {
        Features {
            can_have_empty_directories: true,
            purge: true,
        }
    }

    async fn list(&self, dir: &str) -> Result<Vec<DirEntry>> {
        self.list_dir(dir).instrument(self.span()).await
    }

    async fn new_object(&self, remote: &str) -> Result<Object> {
        async {
            let entry = self.read_entry(remote).await?;
            Ok(Object::from_entry(self.clone(), remote.to_string(), entry))
        }
        .instrument(self.span())
        .await
    }

    async fn put(&self, reader: UploadReader, src: &ObjectInfo) -> Result<Object> {
        let mut object = Object::new(self.clone(), src.remote.clone());
        object.update(reader, src).await?;
        Ok(object)
    }

    async fn mkdir(&self, dir: &str) -> Result<()> {
        async {
            let id = self.find_dir(dir, true).await?;
            tracing::debug!(dir, %id, "directory ready");
            Ok(())
        }
        .instrument(self.span())
        .await
    }

    async fn rmdir(&self, dir: &str) -> Result<()> {
        self.purge_check(dir, true).instrument(self.span()).await
    }

    async fn purge(&self, dir: &str) -> Result<()> {
        self.purge_check(dir, false).instrument(self.span()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_for_directory_matches() {
        assert!(equal_fold("Documents", "documents"));
        assert!(equal_fold("ÄRGER", "ärger"));
        assert!(!equal_fold("Docs", "Documents"));
    }

    #[test]
    fn joins_relative_remotes() {
        assert_eq!(join_remote("", "a.txt"), "a.txt");
        assert_eq!(join_remote("dir/", "a.txt"), "dir/a.txt");
        assert_eq!(join_remote("a/b", "c"), "a/b/c");
    }
}
