use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::modtime::resolve_mod_time;

/// Status value the API reports for a completed operation.
pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Folder,
    Image,
    Text,
    Audio,
    Video,
    Pdf,
    #[default]
    #[serde(other)]
    Unknown,
}

// Explicit nulls decode like missing fields.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One file or folder as returned by the API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Entry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_size: u64,
    #[serde(default)]
    pub parent_id: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub item_type: ItemType,
    #[serde(default)]
    pub hash: Option<String>,
}

impl Entry {
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    pub fn is_folder(&self) -> bool {
        self.item_type == ItemType::Folder
    }

    pub fn mod_time(&self) -> OffsetDateTime {
        resolve_mod_time(self.updated_at.as_deref(), self.created_at.as_deref())
    }

    /// Parent id rendered the same way as entry ids; `None` for the root.
    pub fn parent_id_string(&self) -> Option<String> {
        match self.parent_id.as_ref()? {
            serde_json::Value::Number(number) => Some(number.to_string()),
            serde_json::Value::String(value) if !value.is_empty() => Some(value.clone()),
            _ => None,
        }
    }
}

/// One page of `GET /drive/file-entries`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FileEntries {
    #[serde(default)]
    pub data: Vec<Entry>,
    #[serde(default)]
    pub current_page: Option<u64>,
    #[serde(default)]
    pub next_page: Option<u64>,
    #[serde(default)]
    pub folder: Option<FolderInfo>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FolderInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateFolderRequest<'a> {
    pub name: &'a str,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateFolderResponse {
    #[serde(default)]
    pub folder: Option<FolderInfo>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteRequest<'a> {
    pub entry_ids: &'a [i64],
    pub delete_forever: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "fileEntry")]
    pub file_entry: Option<Entry>,
}
