use std::ops::ControlFlow;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, LOCATION, RANGE, RETRY_AFTER, WWW_AUTHENTICATE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response, redirect};
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::error::FileJumpError;
use crate::pacer::Pacer;
use crate::types::{
    CreateFolderRequest, CreateFolderResponse, DeleteRequest, Entry, FileEntries, FolderInfo,
    STATUS_SUCCESS, StatusResponse, UploadResponse,
};

pub const DEFAULT_BASE_URL: &str = "https://drive.filejump.com/api/v1";
pub const DEFAULT_PER_PAGE: u32 = 1000;

const UPLOAD_MIME: &str = "application/octet-stream";
const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct FileJumpClient {
    http: Client,
    base_url: Url,
    token: String,
    pacer: Pacer,
}

impl FileJumpClient {
    pub fn new(token: impl Into<String>) -> Result<Self, FileJumpError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, FileJumpError> {
        // Redirects are followed by hand so the bearer token never reaches
        // the pre-signed download host.
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        Ok(Self {
            http,
            base_url: Url::parse(&base)?,
            token: token.into(),
            pacer: Pacer::default(),
        })
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetches one page of a folder listing. The first page is requested
    /// without a `page` parameter.
    pub async fn list_page(
        &self,
        folder_id: &str,
        per_page: u32,
        page: Option<u64>,
    ) -> Result<FileEntries, FileJumpError> {
        let mut url = self.endpoint("drive/file-entries")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("folderId", folder_id);
            query.append_pair("perPage", &per_page.max(1).to_string());
            if let Some(page) = page {
                query.append_pair("page", &page.to_string());
            }
        }
        tracing::debug!(folder_id, ?page, "listing folder page");
        let url = &url;
        self.pacer
            .call(|| async move {
                let response = self.json_request(self.http.get(url.clone())).send().await?;
                Self::handle_response(response).await
            })
            .await
    }

    /// Visits every entry of a folder in server order, following `next_page`
    /// until the server stops returning one. Returns `true` when `visit`
    /// broke out early.
    pub async fn for_each_entry<F>(
        &self,
        folder_id: &str,
        per_page: u32,
        mut visit: F,
    ) -> Result<bool, FileJumpError>
    where
        F: FnMut(Entry) -> ControlFlow<()>,
    {
        let mut page = None;
        loop {
            let result = self.list_page(folder_id, per_page, page).await?;
            for entry in result.data {
                if visit(entry).is_break() {
                    return Ok(true);
                }
            }
            match result.next_page {
                Some(next) => page = Some(next),
                None => return Ok(false),
            }
        }
    }

    pub async fn list_folder_all(
        &self,
        folder_id: &str,
        per_page: u32,
    ) -> Result<Vec<Entry>, FileJumpError> {
        let mut items = Vec::new();
        self.for_each_entry(folder_id, per_page, |entry| {
            items.push(entry);
            ControlFlow::Continue(())
        })
        .await?;
        Ok(items)
    }

    /// Creates `name` under `parent_id`; an empty parent is the account root.
    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<FolderInfo, FileJumpError> {
        let url = self.endpoint("folders")?;
        let request = CreateFolderRequest {
            name,
            parent_id: parse_optional_id(parent_id)?,
        };
        tracing::debug!(name, parent_id, "creating folder");
        let (url, request) = (&url, &request);
        let result: CreateFolderResponse = self
            .pacer
            .call(|| async move {
                let response = self
                    .json_request(self.http.post(url.clone()))
                    .json(request)
                    .send()
                    .await?;
                Self::handle_response(response).await
            })
            .await?;
        if let Some(status) = result.status.filter(|status| status != STATUS_SUCCESS) {
            return Err(FileJumpError::Status {
                operation: "create folder",
                status,
            });
        }
        match result.folder {
            Some(folder) if folder.id != 0 => Ok(folder),
            _ => Err(FileJumpError::Status {
                operation: "create folder",
                status: "missing folder id".into(),
            }),
        }
    }

    /// Deletes entries; the call only succeeds when the API reports
    /// `status: success`.
    pub async fn delete_entries(
        &self,
        ids: &[&str],
        delete_forever: bool,
    ) -> Result<(), FileJumpError> {
        let entry_ids = ids
            .iter()
            .map(|id| parse_id(id))
            .collect::<Result<Vec<_>, _>>()?;
        let url = self.endpoint("file-entries/delete")?;
        let request = DeleteRequest {
            entry_ids: &entry_ids,
            delete_forever,
        };
        tracing::debug!(?entry_ids, delete_forever, "deleting entries");
        let (url, request) = (&url, &request);
        let result: StatusResponse = self
            .pacer
            .call(|| async move {
                let response = self
                    .json_request(self.http.post(url.clone()))
                    .json(request)
                    .send()
                    .await?;
                Self::handle_response(response).await
            })
            .await?;
        ensure_success("delete", result.status)
    }

    /// Uploads buffered content as a multipart form. The body is rebuilt for
    /// every attempt, so the call is retried like any other.
    pub async fn upload(
        &self,
        parent_id: &str,
        file_name: &str,
        content: Bytes,
    ) -> Result<Entry, FileJumpError> {
        let url = self.endpoint("uploads")?;
        tracing::debug!(parent_id, file_name, size = content.len(), "uploading buffered file");
        let (url, content) = (&url, &content);
        let result: UploadResponse = self
            .pacer
            .call(|| async move {
                let part = Part::stream_with_length(Body::from(content.clone()), content.len() as u64);
                let form = upload_form(parent_id, file_name, part)?;
                let response = self
                    .json_request(self.http.post(url.clone()))
                    .multipart(form)
                    .send()
                    .await?;
                Self::handle_response(response).await
            })
            .await?;
        uploaded_entry(result)
    }

    /// Streams `size` bytes from `reader` as a multipart form in a single
    /// attempt.
    pub async fn upload_stream<R>(
        &self,
        parent_id: &str,
        file_name: &str,
        reader: R,
        size: u64,
    ) -> Result<Entry, FileJumpError>
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        let url = self.endpoint("uploads")?;
        tracing::debug!(parent_id, file_name, size, "uploading streamed file");
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(reader)), size);
        let form = upload_form(parent_id, file_name, part)?;
        let request = self.json_request(self.http.post(url)).multipart(form);
        let result: UploadResponse = self
            .pacer
            .call_once(async move {
                let response = request.send().await?;
                Self::handle_response(response).await
            })
            .await?;
        uploaded_entry(result)
    }

    /// Starts a download of entry `id`. A redirect is followed once, without
    /// the `Authorization` header; `range` is sent to both hops.
    pub async fn download(&self, id: &str, range: Option<&str>) -> Result<Response, FileJumpError> {
        if id.is_empty() {
            return Err(FileJumpError::InvalidId(id.to_string()));
        }
        let url = self.endpoint(&format!("file-entries/download/{id}"))?;
        tracing::debug!(id, ?range, "downloading entry");
        let url = &url;
        self.pacer
            .call(|| async move {
                let mut request = self.authorized(self.http.get(url.clone()));
                if let Some(range) = range {
                    request = request.header(RANGE, range);
                }
                let response = request.send().await?;
                if !response.status().is_redirection() {
                    return Self::check_status(response).await;
                }
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or(FileJumpError::MissingRedirectLocation)?;
                let target = response.url().join(location)?;
                tracing::debug!(id, %target, "following download redirect");
                let mut follow = self.http.get(target);
                if let Some(range) = range {
                    follow = follow.header(RANGE, range);
                }
                Self::check_status(follow.send().await?).await
            })
            .await
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    fn json_request(&self, request: RequestBuilder) -> RequestBuilder {
        self.authorized(request).header(ACCEPT, "application/json")
    }

    fn endpoint(&self, path: &str) -> Result<Url, FileJumpError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn check_status(response: Response) -> Result<Response, FileJumpError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let headers = response.headers();
        let www_authenticate = headers
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        Err(FileJumpError::Api {
            status,
            body: truncate_body(body),
            www_authenticate,
            retry_after,
        })
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, FileJumpError> {
        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| FileJumpError::Decode {
            source,
            body: truncate_body(body),
        })
    }
}

fn upload_form(parent_id: &str, file_name: &str, part: Part) -> Result<Form, FileJumpError> {
    let part = part.file_name(file_name.to_string()).mime_str(UPLOAD_MIME)?;
    let mut form = Form::new().part("file", part);
    if !parent_id.is_empty() {
        form = form.text("parentId", parent_id.to_string());
    }
    Ok(form)
}

fn uploaded_entry(result: UploadResponse) -> Result<Entry, FileJumpError> {
    ensure_success("upload", result.status)?;
    result.file_entry.ok_or_else(|| FileJumpError::Status {
        operation: "upload",
        status: "missing file entry".into(),
    })
}

fn ensure_success(operation: &'static str, status: Option<String>) -> Result<(), FileJumpError> {
    match status {
        Some(status) if status == STATUS_SUCCESS => Ok(()),
        status => Err(FileJumpError::Status {
            operation,
            status: status.unwrap_or_default(),
        }),
    }
}

pub(crate) fn parse_id(id: &str) -> Result<i64, FileJumpError> {
    id.parse::<i64>()
        .map_err(|_| FileJumpError::InvalidId(id.to_string()))
}

fn parse_optional_id(id: &str) -> Result<Option<i64>, FileJumpError> {
    if id.is_empty() {
        Ok(None)
    } else {
        parse_id(id).map(Some)
    }
}

/// `Retry-After` is either delay-seconds or an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(SystemTime::now()).unwrap_or_default())
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_accepts_seconds_and_dates() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn endpoints_keep_the_api_prefix() {
        let client = FileJumpClient::with_base_url("https://drive.example/api/v1", "t").unwrap();
        assert_eq!(
            client.endpoint("/folders").unwrap().as_str(),
            "https://drive.example/api/v1/folders"
        );
        assert_eq!(
            client.endpoint("file-entries/download/5").unwrap().as_str(),
            "https://drive.example/api/v1/file-entries/download/5"
        );
    }

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id(""), Err(FileJumpError::InvalidId(_))));
        assert_eq!(parse_optional_id("").unwrap(), None);
        assert_eq!(parse_optional_id("9").unwrap(), Some(9));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "é".repeat(MAX_ERROR_BODY);
        assert!(truncate_body(body).len() <= MAX_ERROR_BODY);
    }
}
