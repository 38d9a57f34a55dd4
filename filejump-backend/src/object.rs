use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use filejump_core::Entry;
use futures_util::TryStreamExt;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::OnceCell;
use tokio_util::io::StreamReader;
use tracing::Instrument;

use crate::error::{BackendError, Result};
use crate::fs::{FileJumpFs, HashType, UploadReader};
use crate::range::{OpenOption, range_header};

/// Body of an opened object.
pub type ReadStream = Pin<Box<dyn AsyncRead + Send>>;

/// Describes the source of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub remote: String,
    /// `None` for streams of unknown length, which cannot be uploaded.
    pub size: Option<u64>,
    pub mod_time: OffsetDateTime,
}

impl ObjectInfo {
    pub fn new(remote: impl Into<String>, size: Option<u64>, mod_time: OffsetDateTime) -> Self {
        Self {
            remote: remote.into(),
            size,
            mod_time,
        }
    }
}

#[derive(Debug, Clone)]
struct Metadata {
    id: String,
    size: u64,
    mod_time: OffsetDateTime,
    mime: Option<String>,
}

impl Metadata {
    fn from_entry(entry: &Entry) -> Self {
        // An id of 0 means the server never assigned one.
        let id = if entry.id == 0 {
            String::new()
        } else {
            entry.id_string()
        };
        Self {
            id,
            size: entry.file_size,
            mod_time: entry.mod_time(),
            mime: entry.mime.clone(),
        }
    }
}

/// A file on the remote. Metadata comes from the listing, lookup or upload
/// that produced the handle, or is fetched on first access.
#[derive(Debug, Clone)]
pub struct Object {
    fs: FileJumpFs,
    remote: String,
    meta: OnceCell<Metadata>,
}

impl Object {
    pub(crate) fn new(fs: FileJumpFs, remote: String) -> Self {
        Self {
            fs,
            remote,
            meta: OnceCell::new(),
        }
    }

    pub(crate) fn from_entry(fs: FileJumpFs, remote: String, entry: Entry) -> Self {
        Self {
            fs,
            remote,
            meta: OnceCell::new_with(Some(Metadata::from_entry(&entry))),
        }
    }

    pub fn fs(&self) -> &FileJumpFs {
        &self.fs
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Server id, when metadata is loaded and an id was assigned.
    pub fn id(&self) -> Option<&str> {
        self.meta
            .get()
            .map(|meta| meta.id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.meta.get().and_then(|meta| meta.mime.as_deref())
    }

    pub async fn size(&self) -> Result<u64> {
        Ok(self.metadata().await?.size)
    }

    pub async fn mod_time(&self) -> Result<OffsetDateTime> {
        Ok(self.metadata().await?.mod_time)
    }

    pub fn hash(&self, _kind: HashType) -> Result<String> {
        Err(BackendError::Unsupported("hashes"))
    }

    pub async fn set_mod_time(&self, _mod_time: OffsetDateTime) -> Result<()> {
        Err(BackendError::Unsupported("setting modification times"))
    }

    pub fn storable(&self) -> bool {
        true
    }

    /// Opens the object for reading. Only the last range-like option is
    /// honoured.
    pub async fn open(&self, options: &[OpenOption]) -> Result<ReadStream> {
        async {
            let meta = self.metadata().await?;
            if meta.id.is_empty() {
                return Err(BackendError::Precondition("can't download an object without an id"));
            }
            let range = range_header(options, Some(meta.size));
            let response = self.fs.client().download(&meta.id, range.as_deref()).await?;
            let body = response.bytes_stream().map_err(std::io::Error::other);
            Ok(Box::pin(StreamReader::new(body)) as ReadStream)
        }
        .instrument(self.fs.span())
        .await
    }

    /// Replaces the object's content. The handle takes the metadata the
    /// server reports for the new upload.
    pub async fn update(&mut self, reader: UploadReader, src: &ObjectInfo) -> Result<()> {
        let entry = self.upload(reader, src).instrument(self.fs.span()).await?;
        self.meta = OnceCell::new_with(Some(Metadata::from_entry(&entry)));
        Ok(())
    }

    pub async fn remove(&self) -> Result<()> {
        async {
            let meta = self.metadata().await?;
            if meta.id.is_empty() {
                return Err(BackendError::Precondition("can't delete an object without an id"));
            }
            tracing::debug!(remote = %self.remote, id = %meta.id, "removing object");
            self.fs.client().delete_entries(&[&meta.id], true).await?;
            Ok(())
        }
        .instrument(self.fs.span())
        .await
    }

    async fn metadata(&self) -> Result<&Metadata> {
        self.meta
            .get_or_try_init(|| async {
                let entry = self.fs.read_entry(&self.remote).await?;
                Ok(Metadata::from_entry(&entry))
            })
            .await
    }

    async fn upload(&self, mut reader: UploadReader, src: &ObjectInfo) -> Result<Entry> {
        let size = src
            .size
            .ok_or(BackendError::Precondition("can't upload objects of unknown size"))?;
        let (leaf, parent_id) = self.fs.find_path(&self.remote, true).await?;
        let options = self.fs.options();
        let name = options.encoding.from_standard_name(&leaf);
        tracing::debug!(remote = %self.remote, size, mod_time = %src.mod_time, "uploading object");

        let client = self.fs.client();
        if size < options.upload_cutoff {
            let mut content = Vec::new();
            (&mut reader).take(size + 1).read_to_end(&mut content).await?;
            let actual = content.len() as u64;
            if actual != size {
                return Err(BackendError::SizeMismatch {
                    expected: size,
                    actual,
                });
            }
            Ok(client.upload(&parent_id, &name, Bytes::from(content)).await?)
        } else {
            Ok(client
                .upload_stream(&parent_id, &name, reader.take(size), size)
                .await?)
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_fs(server: &MockServer) -> FileJumpFs {
        let mut options = Options::new("token");
        options.base_url = format!("{}/api/v1", server.uri());
        options.pacer_min_sleep = Duration::from_millis(1);
        options.pacer_max_sleep = Duration::from_millis(2);
        FileJumpFs::new("remote", "", options).await.unwrap()
    }

    #[tokio::test]
    async fn metadata_is_fetched_once_on_first_access() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/drive/file-entries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": 4, "name": "a.txt", "type": "text", "file_size": 12,
                    "updated_at": "2024-02-03T04:05:06Z"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let object = Object::new(test_fs(&server).await, "a.txt".into());
        assert_eq!(object.id(), None);
        assert_eq!(object.size().await.unwrap(), 12);
        assert_eq!(object.mod_time().await.unwrap().unix_timestamp(), 1_706_933_106);
        assert_eq!(object.id(), Some("4"));
    }

    #[tokio::test]
    async fn unsupported_operations_report_errors() {
        let server = MockServer::start().await;
        let object = Object::new(test_fs(&server).await, "x".into());
        assert!(matches!(
            object.hash(HashType::Md5),
            Err(BackendError::Unsupported(_))
        ));
        assert!(matches!(
            object.set_mod_time(OffsetDateTime::UNIX_EPOCH).await,
            Err(BackendError::Unsupported(_))
        ));
        assert!(object.storable());
    }

    #[tokio::test]
    async fn short_reader_is_a_size_mismatch() {
        let server = MockServer::start().await;
        let mut object = Object::new(test_fs(&server).await, "short.bin".into());
        let src = ObjectInfo::new("short.bin", Some(10), OffsetDateTime::UNIX_EPOCH);

        let err = object
            .update(Box::new(std::io::Cursor::new(b"abc".to_vec())), &src)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BackendError::SizeMismatch {
                expected: 10,
                actual: 3
            }
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
