//! WebDAV backend.
//!
//! Listings go through PROPFIND with `Depth: 1`; the multistatus payload is
//! parsed with a namespace-agnostic event reader so that servers answering
//! with `D:`, `d:`, `lp1:` or a default namespace all work. Clients are
//! built per call with a bounded timeout and never pooled across scans.

use crate::model::{is_image_name, FolderEntry, ImageRef, SourceConfig};
use crate::{ImageBackend, ImageStream, Result, SourceError};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Method};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::warn;
use url::Url;

/// Timeout applied to directory listings
const LIST_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout applied to content downloads
const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:resourcetype/><d:getcontentlength/><d:getlastmodified/></d:prop></d:propfind>"#;

pub struct WebDavBackend {
    config: Arc<SourceConfig>,
}

/// One entry of a multistatus response
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DavResource {
    pub href: String,
    pub is_collection: bool,
    pub content_length: u64,
    pub last_modified: i64,
}

impl WebDavBackend {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn client(timeout: Duration) -> Result<Client> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    /// Collection URL of the configured root, with a trailing slash.
    fn base_url(&self) -> String {
        let host = self.config.host.trim_end_matches('/');
        let path = self.config.path.trim_matches('/');
        if path.is_empty() {
            format!("{host}/")
        } else {
            format!("{host}/{path}/")
        }
    }

    async fn list(&self, client: &Client, url: &str) -> Result<Vec<DavResource>> {
        let method = Method::from_bytes(b"PROPFIND").expect("valid method name");
        let mut request = client
            .request(method, url)
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY);
        if !self.config.user.is_empty() {
            request = request.basic_auth(&self.config.user, Some(&self.config.password));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Connection(format!(
                "{} on {}",
                response.status(),
                url
            )));
        }
        let body = response.text().await?;
        parse_multistatus(&body)
    }

    fn absolutize(base: &Url, href: &str) -> Option<String> {
        if href.starts_with("http://") || href.starts_with("https://") {
            Some(href.to_string())
        } else {
            base.join(href).ok().map(|joined| joined.to_string())
        }
    }
}

#[async_trait]
impl ImageBackend for WebDavBackend {
    async fn scan(&self) -> Result<Vec<ImageRef>> {
        let client = Self::client(LIST_TIMEOUT)?;
        let root = self.base_url();
        let base =
            Url::parse(&root).map_err(|err| SourceError::Connection(err.to_string()))?;

        let mut references = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pending = vec![root.clone()];
        let mut is_root = true;

        while let Some(dir_url) = pending.pop() {
            if !visited.insert(normalized(&dir_url).to_string()) {
                continue;
            }
            let resources = match self.list(&client, &dir_url).await {
                Ok(resources) => resources,
                Err(err) if is_root => return Err(err),
                Err(err) => {
                    warn!("Skipping WebDAV directory {}: {}", dir_url, err);
                    continue;
                }
            };
            is_root = false;

            for resource in resources {
                let Some(full_url) = Self::absolutize(&base, &resource.href) else {
                    continue;
                };
                // Le listing d'une collection contient la collection elle-même
                if normalized(&full_url) == normalized(&dir_url) {
                    continue;
                }
                if resource.is_collection {
                    if self.config.recursive {
                        pending.push(full_url);
                    }
                } else if is_image_name(last_segment(&resource.href)) {
                    references.push(ImageRef::new(
                        full_url,
                        Arc::clone(&self.config),
                        resource.last_modified,
                        resource.content_length,
                    ));
                }
            }
        }
        Ok(references)
    }

    async fn list_folders(&self, relative_path: &str) -> Result<Vec<FolderEntry>> {
        let client = Self::client(LIST_TIMEOUT)?;
        let host = self.config.host.trim_end_matches('/');
        let relative = relative_path.trim_matches('/');
        let url = if relative.is_empty() {
            format!("{host}/")
        } else {
            format!("{host}/{relative}/")
        };
        let base = Url::parse(&url).map_err(|err| SourceError::Connection(err.to_string()))?;

        let mut folders = Vec::new();
        for resource in self.list(&client, &url).await? {
            let Some(full_url) = Self::absolutize(&base, &resource.href) else {
                continue;
            };
            if normalized(&full_url) == normalized(&url) {
                continue;
            }
            if resource.is_collection {
                folders.push(FolderEntry {
                    name: last_segment(&resource.href).to_string(),
                    is_directory: true,
                });
            }
        }
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }

    async fn open_stream(&self, reference: &ImageRef) -> Result<ImageStream> {
        let client = Self::client(STREAM_TIMEOUT)?;
        let mut request = client.get(&reference.locator);
        if !self.config.user.is_empty() {
            request = request.basic_auth(&self.config.user, Some(&self.config.password));
        }
        let response = request.send().await?.error_for_status()?;
        let stream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        Ok(Box::new(StreamReader::new(stream)))
    }
}

fn normalized(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn last_segment(href: &str) -> &str {
    let trimmed = href.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, segment)) => segment,
        None => trimmed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    None,
    Href,
    ContentLength,
    LastModified,
}

/// Parses a PROPFIND multistatus payload into flat resources.
///
/// Only local element names are matched; namespace prefixes vary across
/// servers and are ignored.
pub(crate) fn parse_multistatus(xml: &str) -> Result<Vec<DavResource>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut resources = Vec::new();
    let mut current: Option<DavResource> = None;
    let mut field = Field::None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => match element.local_name().as_ref() {
                b"response" => current = Some(DavResource::default()),
                b"href" => field = Field::Href,
                b"getcontentlength" => field = Field::ContentLength,
                b"getlastmodified" => field = Field::LastModified,
                b"collection" => {
                    if let Some(resource) = current.as_mut() {
                        resource.is_collection = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(element)) => {
                if element.local_name().as_ref() == b"collection" {
                    if let Some(resource) = current.as_mut() {
                        resource.is_collection = true;
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(resource) = current.as_mut() {
                    let value = text
                        .unescape()
                        .map_err(|err| SourceError::InvalidResponse(err.to_string()))?;
                    match field {
                        Field::Href => resource.href = value.into_owned(),
                        Field::ContentLength => {
                            resource.content_length = value.trim().parse().unwrap_or(0)
                        }
                        Field::LastModified => {
                            resource.last_modified = parse_http_date(value.trim())
                        }
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"response" => {
                    if let Some(resource) = current.take() {
                        resources.push(resource);
                    }
                }
                b"href" | b"getcontentlength" | b"getlastmodified" => field = Field::None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(SourceError::InvalidResponse(err.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(resources)
}

/// RFC 1123 date (the `getlastmodified` format) to epoch milliseconds, 0 on
/// anything unparseable.
fn parse_http_date(value: &str) -> i64 {
    chrono::DateTime::parse_from_rfc2822(value)
        .map(|date| date.timestamp_millis())
        .unwrap_or(0)
}
