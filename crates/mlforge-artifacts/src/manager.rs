//! Upload and download driver.
//!
//! [`ArtifactManager`] decides between a multipart and a single-shot upload
//! based on what the resolver reports, and moves the bytes to and from the
//! presigned URLs it hands out.

use crate::connection::{transport_error, Connection};
use crate::resolver::ArtifactResolver;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use mlforge_abstraction::{ArtifactEndpoints, ArtifactError, ArtifactResult};
use reqwest::header::{CONTENT_LENGTH, ETAG};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response};
use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Default multipart part size (64 MiB).
pub const DEFAULT_PART_SIZE: u64 = 64 * 1024 * 1024;

/// Size of the chunks a part body is streamed in.
const BODY_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Tuning for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Bytes per multipart part; the last part may be shorter.
    pub part_size: u64,
    /// Maximum number of parts in flight at once. `1` uploads strictly in order.
    pub max_concurrency: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { part_size: DEFAULT_PART_SIZE, max_concurrency: 1 }
    }
}

/// Drives artifact uploads and downloads through an [`ArtifactResolver`].
///
/// The manager keeps no state between calls. Each call runs to completion
/// before returning and aborts on the first failure.
#[derive(Debug)]
pub struct ArtifactManager<E> {
    conn: Arc<Connection>,
    resolver: ArtifactResolver<E>,
    options: UploadOptions,
}

impl<E: ArtifactEndpoints> ArtifactManager<E> {
    #[must_use]
    pub fn new(conn: Arc<Connection>, resolver: ArtifactResolver<E>) -> Self {
        Self { conn, resolver, options: UploadOptions::default() }
    }

    #[must_use]
    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resolver(&self) -> &ArtifactResolver<E> {
        &self.resolver
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Uploads `stream` with the configured part size.
    ///
    /// # Errors
    /// See [`ArtifactManager::upload_with_part_size`].
    pub async fn upload<R>(&self, stream: R) -> ArtifactResult<()>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send + Sync + 'static,
    {
        self.upload_with_part_size(stream, self.options.part_size).await
    }

    /// Uploads `stream` from its beginning.
    ///
    /// If the backend accepts multipart uploads the stream is sent in parts of
    /// `part_size` bytes, each to its own presigned URL and committed with the
    /// returned ETag, and the artifact is finalized once every part is
    /// committed. Otherwise the whole stream goes in one request: a form POST
    /// when the backend requires form fields, a raw PUT when it does not.
    ///
    /// # Errors
    /// Returns `ArtifactError::InvalidPartSize` for a zero `part_size` (before
    /// any request is made), and the first failure of any negotiation,
    /// transfer or commit otherwise.
    pub async fn upload_with_part_size<R>(&self, mut stream: R, part_size: u64) -> ArtifactResult<()>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send + Sync + 'static,
    {
        if part_size == 0 {
            return Err(ArtifactError::InvalidPartSize);
        }
        stream.rewind().await?;

        if self.resolver.is_multipart_upload_ok().await? {
            self.multipart_upload(stream, part_size).await?;
        } else {
            self.single_shot_upload(stream).await?;
        }

        info!(key = %self.resolver.artifact_key(), "upload complete");
        Ok(())
    }

    /// Downloads the artifact into memory.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the URL cannot be obtained or the object
    /// store rejects the request.
    pub async fn download(&self) -> ArtifactResult<Bytes> {
        let response = self.download_response().await?;
        let body = response.bytes().await.map_err(|e| transport_error(&e))?;

        debug!(key = %self.resolver.artifact_key(), size = body.len(), "Downloaded artifact");
        Ok(body)
    }

    /// Downloads the artifact into `writer` chunk by chunk, returning the
    /// number of bytes written.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the transfer fails or `writer` errors.
    pub async fn download_to_writer<W>(&self, writer: &mut W) -> ArtifactResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let response = self.download_response().await?;
        let written = write_body(response, writer).await?;

        debug!(key = %self.resolver.artifact_key(), size = written, "Downloaded artifact");
        Ok(written)
    }

    /// Downloads the artifact into a file at `path`, returning its size.
    ///
    /// The body is written to a sibling `.part` file which replaces `path`
    /// only once the whole artifact has arrived. On failure an existing file
    /// at `path` is left untouched.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the transfer fails or the file cannot be written.
    pub async fn download_to_file(&self, path: &Path) -> ArtifactResult<u64> {
        let response = self.download_response().await?;
        let partial = partial_path(path);

        let result = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            let written = write_body(response, &mut file).await?;
            file.sync_all().await?;
            Ok::<_, ArtifactError>(written)
        }
        .await;

        match result {
            Ok(written) => {
                tokio::fs::rename(&partial, path).await?;
                debug!(
                    key = %self.resolver.artifact_key(),
                    path = %path.display(),
                    size = written,
                    "Downloaded artifact to file"
                );
                Ok(written)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial download");
                }
                Err(e)
            }
        }
    }

    async fn download_response(&self) -> ArtifactResult<Response> {
        let url = self.resolver.get_download_url().await?;
        let response = self.conn.send(self.conn.client().get(&url)).await?;
        check_transfer(response, None).await
    }

    async fn multipart_upload<R>(&self, mut stream: R, part_size: u64) -> ArtifactResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let max_concurrency = self.options.max_concurrency.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut part_num = 1u64;
        let mut exhausted = false;

        loop {
            while !exhausted && in_flight.len() < max_concurrency {
                let data = read_part(&mut stream, part_size).await?;
                // part 1 goes out even when empty
                if data.is_empty() && part_num > 1 {
                    exhausted = true;
                    break;
                }
                if (data.len() as u64) < part_size {
                    exhausted = true;
                }

                in_flight.push(self.upload_part(part_num, data));
                part_num += 1;
            }

            match in_flight.next().await {
                Some(result) => result?,
                None => break,
            }
        }

        self.resolver.commit_artifact().await
    }

    async fn upload_part(&self, part_num: u64, data: Bytes) -> ArtifactResult<()> {
        let url = self.resolver.get_upload_url(part_num).await?;
        info!(
            key = %self.resolver.artifact_key(),
            part_number = part_num,
            size = data.len(),
            "uploading part"
        );

        let len = data.len() as u64;
        let request = self.conn.client().put(&url).header(CONTENT_LENGTH, len).body(part_body(data));
        let response = self.conn.send(request).await?;
        let response = check_transfer(response, Some(part_num)).await?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .ok_or(ArtifactError::MissingEtag { part_number: part_num })?
            .to_string();

        self.resolver.commit_part(part_num, &etag).await
    }

    async fn single_shot_upload<R>(&self, mut stream: R) -> ArtifactResult<()>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send + Sync + 'static,
    {
        let len = stream.seek(SeekFrom::End(0)).await?;
        stream.rewind().await?;

        let url = self.resolver.get_upload_url(0).await?;
        let post_fields = self.resolver.post_fields().await?;
        let body = Body::wrap_stream(ReaderStream::new(stream));

        let request = if post_fields.is_empty() {
            debug!(key = %self.resolver.artifact_key(), size = len, "Uploading artifact with PUT");
            self.conn.client().put(&url).header(CONTENT_LENGTH, len).body(body)
        } else {
            debug!(
                key = %self.resolver.artifact_key(),
                size = len,
                fields = post_fields.len(),
                "Uploading artifact with form POST"
            );
            let form = post_fields
                .iter()
                .fold(Form::new(), |form, (name, value)| form.text(name.clone(), value.clone()))
                .part("file", Part::stream_with_length(body, len).file_name("file"));
            self.conn.client().post(&url).multipart(form)
        };

        let response = self.conn.send(request).await?;
        check_transfer(response, None).await?;
        Ok(())
    }
}

/// Streams a response body into `writer`, returning the number of bytes written.
async fn write_body<W>(response: Response, writer: &mut W) -> ArtifactResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut body = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| transport_error(&e))?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}

/// `<path>.part`, next to `path`.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Reads up to `part_size` bytes from `stream`.
async fn read_part<R>(stream: &mut R, part_size: u64) -> ArtifactResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    stream.take(part_size).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Wraps a part in a streamed body of bounded chunks.
fn part_body(data: Bytes) -> Body {
    let chunks: Vec<Result<Bytes, std::io::Error>> = (0..data.len())
        .step_by(BODY_CHUNK_SIZE)
        .map(|start| Ok(data.slice(start..(start + BODY_CHUNK_SIZE).min(data.len()))))
        .collect();
    Body::wrap_stream(futures::stream::iter(chunks))
}

/// Requires a success status from the object store.
async fn check_transfer(response: Response, part_number: Option<u64>) -> ArtifactResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(ArtifactError::Transfer { part_number, status: status.as_u16(), message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_upload_options_default() {
        let options = UploadOptions::default();
        assert_eq!(options.part_size, 67_108_864);
        assert_eq!(options.max_concurrency, 1);
    }

    #[test]
    fn test_partial_path_is_sibling() {
        assert_eq!(partial_path(Path::new("/tmp/out/model.bin")), PathBuf::from("/tmp/out/model.bin.part"));
        assert_eq!(partial_path(Path::new("notes")), PathBuf::from("notes.part"));
    }

    #[test]
    fn test_manager_debug_names_artifact() {
        let conn = Arc::new(Connection::new("http://localhost:3000"));
        let resolver = ArtifactResolver::for_experiment_run(conn.clone(), "run-1", "model.pkl");
        let manager = ArtifactManager::new(conn, resolver);

        let debug = format!("{:?}", manager);
        assert!(debug.contains("ArtifactManager"));
        assert!(debug.contains("model.pkl"));
        assert!(debug.contains("run-1"));
    }

    #[tokio::test]
    async fn test_read_part_splits_stream() {
        let mut stream = Cursor::new(b"abcdefghij".to_vec());

        assert_eq!(read_part(&mut stream, 4).await.unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(read_part(&mut stream, 4).await.unwrap(), Bytes::from_static(b"efgh"));
        assert_eq!(read_part(&mut stream, 4).await.unwrap(), Bytes::from_static(b"ij"));
        assert!(read_part(&mut stream, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_part_size_rejected_before_any_request() {
        // nothing listens here, so any request would fail with a transport error
        let conn = Arc::new(Connection::new("http://127.0.0.1:1"));
        let resolver = ArtifactResolver::for_experiment_run(conn.clone(), "run-1", "model.pkl");
        let manager = ArtifactManager::new(conn, resolver);

        let err = manager
            .upload_with_part_size(Cursor::new(b"data".to_vec()), 0)
            .await
            .unwrap_err();
        assert_eq!(err, ArtifactError::InvalidPartSize);
    }

    #[tokio::test]
    async fn test_upload_rewinds_stream() {
        let mut server = mockito::Server::new_async().await;
        let upload_url = format!("{}/upload", server.url());
        let _url = server
            .mock("POST", "/api/v1/modeldb/experiment-run/getUrlForArtifact")
            .with_status(200)
            .with_body(serde_json::json!({"url": upload_url, "multipart_upload_ok": false}).to_string())
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/upload")
            .match_body("hello")
            .with_status(200)
            .create_async()
            .await;

        let conn = Arc::new(Connection::new(server.url()));
        let resolver = ArtifactResolver::for_experiment_run(conn.clone(), "run-1", "greeting");
        let manager = ArtifactManager::new(conn, resolver);

        let mut stream = Cursor::new(b"hello".to_vec());
        stream.set_position(3);
        manager.upload(stream).await.unwrap();

        put.assert_async().await;
    }
}
