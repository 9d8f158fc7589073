use anyhow::{Context, Result};
use axum::body::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

const LIST_PAGE_SIZE: u32 = 20;
const LIST_FIELDS: &str = "files(id,name,mimeType,modifiedTime)";
const METADATA_FIELDS: &str = "files(id,name,mimeType)";

/// Downstream reply passed through to the browser as-is.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    api_base: Url,
}

impl DriveClient {
    pub fn new(http: Client, api_base: &str) -> Result<Self> {
        let mut normalized = api_base.trim().to_owned();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }

        let api_base = Url::parse(&normalized).context("invalid drive api base url")?;
        Ok(Self { http, api_base })
    }

    fn files_url(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .context("failed to compose drive endpoint")
    }

    /// Lists the user's files without interpreting the reply, so callers can
    /// react to an expired access token.
    pub async fn list_files_raw(&self, access_token: &str) -> Result<DownstreamResponse> {
        let url = self.files_url("files")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(&[
                ("pageSize", LIST_PAGE_SIZE.to_string()),
                ("fields", LIST_FIELDS.to_owned()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        Ok(DownstreamResponse { status, body })
    }

    pub async fn list_file_metadata(
        &self,
        access_token: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>> {
        let url = self.files_url("files")?;
        let list = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(&[
                ("pageSize", page_size.to_string()),
                ("fields", METADATA_FIELDS.to_owned()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<FileList>()
            .await?;
        Ok(list.files)
    }

    /// Google Docs are exported as plain text; anything else is downloaded.
    pub async fn fetch_content(&self, access_token: &str, file: &DriveFile) -> Result<String> {
        let encoded_id = urlencoding::encode(&file.id);
        let request = if file.mime_type == GOOGLE_DOC_MIME {
            let url = self.files_url(&format!("files/{encoded_id}/export"))?;
            self.http.get(url).query(&[("mimeType", "text/plain")])
        } else {
            let url = self.files_url(&format!("files/{encoded_id}"))?;
            self.http.get(url).query(&[("alt", "media")])
        };

        let text = request
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}
