//! S3-compatible storage backend using the AWS SDK.
//!
//! Buckets have no atomic rename, so the two-generation model is emulated
//! with key-prefix rotation: the bucket holds keys under `a/` and `b/`, a
//! bucket-website routing rule marks one prefix as current, writes land in
//! the other, and commit flips the routing rule before deleting the retired
//! prefix. One repository per bucket; concurrent syncers on the same bucket
//! are not supported.

use crate::error::{StorageError, StorageResult};
use crate::traits::{Generation, Storage};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, Condition,
    CreateBucketConfiguration, Delete, IndexDocument, ObjectIdentifier, Redirect, RoutingRule,
    WebsiteConfiguration,
};
use bytes::{Bytes, BytesMut};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use stillage_core::checksum::Checksum;
use stillage_core::stream::{ByteSink, ByteStream, ChecksumSink};
use tokio_util::io::ReaderStream;
use tracing::{info, instrument};

/// Part size for multipart uploads (8 MiB). Files smaller than this are
/// written with a single `PutObject`.
const PART_SIZE: usize = 8 * 1024 * 1024;

const PREFIX_A: &str = "a/";
const PREFIX_B: &str = "b/";

/// S3-backed mirror store.
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    current_prefix: Mutex<String>,
    dirty: AtomicBool,
}

impl S3Storage {
    /// Create a backend for `bucket`, creating the bucket if needed and
    /// discovering the current generation prefix from the bucket-website
    /// routing rule (a fresh bucket starts at `a/`).
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        let has_key = access_key_id.is_some();
        if has_key != secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));
        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                key_id,
                secret,
                None,
                None,
                "stillage-config",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint_url) = endpoint {
            // Handle bare host:port endpoints (e.g. "minio:9000").
            let normalized = if endpoint_url.to_ascii_lowercase().starts_with("http") {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            };
            builder = builder.endpoint_url(normalized);
        }
        if force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        ensure_bucket(&client, bucket, &resolved_region).await?;
        let current = current_prefix(&client, bucket)
            .await?
            .unwrap_or_else(|| PREFIX_A.to_string());
        configure_website(&client, bucket, &current).await?;

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            region: resolved_region,
            current_prefix: Mutex::new(current),
            dirty: AtomicBool::new(false),
        })
    }

    fn prefix_for(&self, generation: Generation) -> String {
        let current = self.current_prefix.lock().unwrap().clone();
        match generation {
            Generation::Permanent => current,
            Generation::Staging => other_prefix(&current).to_string(),
        }
    }
}

fn other_prefix(prefix: &str) -> &'static str {
    if prefix == PREFIX_A { PREFIX_B } else { PREFIX_A }
}

fn s3_err<E>(err: E) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

async fn ensure_bucket(client: &Client, bucket: &str, region: &str) -> StorageResult<()> {
    let mut request = client.create_bucket().bucket(bucket);
    // us-east-1 must not carry a location constraint.
    if region != "us-east-1" {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            info!(bucket, "bucket created");
            Ok(())
        }
        Err(err) => {
            let service_err = err.into_service_error();
            if service_err.is_bucket_already_owned_by_you() {
                Ok(())
            } else if service_err.is_bucket_already_exists() {
                Err(StorageError::Config(format!(
                    "bucket name {bucket} already taken by another AWS user"
                )))
            } else {
                Err(s3_err(service_err))
            }
        }
    }
}

/// Read the current generation prefix from the bucket-website routing rule.
async fn current_prefix(client: &Client, bucket: &str) -> StorageResult<Option<String>> {
    let website = match client.get_bucket_website().bucket(bucket).send().await {
        Ok(out) => out,
        Err(err) => {
            let service_err = err.into_service_error();
            if service_err
                .meta()
                .code()
                .is_some_and(|code| code == "NoSuchWebsiteConfiguration")
            {
                return Ok(None);
            }
            return Err(s3_err(service_err));
        }
    };

    let rules = website.routing_rules();
    if rules.len() != 1 {
        return Ok(None);
    }
    Ok(rules[0]
        .condition()
        .and_then(|c| c.key_prefix_equals())
        .map(|p| p.to_string()))
}

async fn configure_website(client: &Client, bucket: &str, prefix: &str) -> StorageResult<()> {
    let configuration = WebsiteConfiguration::builder()
        .index_document(
            IndexDocument::builder()
                .suffix("index.html")
                .build()
                .map_err(s3_err)?,
        )
        .routing_rules(
            RoutingRule::builder()
                .condition(Condition::builder().key_prefix_equals(prefix).build())
                .redirect(Redirect::builder().replace_key_prefix_with("").build())
                .build(),
        )
        .build();

    client
        .put_bucket_website()
        .bucket(bucket)
        .website_configuration(configuration)
        .send()
        .await
        .map_err(|err| s3_err(err.into_service_error()))?;
    Ok(())
}

#[async_trait]
impl Storage for S3Storage {
    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn open_reader(&self, path: &str, generation: Generation) -> StorageResult<ByteStream> {
        let key = format!("{}{}", self.prefix_for(generation), path);
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(out) => Ok(Box::pin(ReaderStream::new(out.body.into_async_read()))),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Err(StorageError::NotFound(path.to_string()))
                } else {
                    Err(s3_err(service_err))
                }
            }
        }
    }

    #[instrument(skip(self, expected), fields(backend = "s3", bucket = %self.bucket))]
    async fn staging_writer(
        &self,
        path: &str,
        expected: Option<Checksum>,
    ) -> StorageResult<Box<dyn ByteSink>> {
        self.dirty.store(true, Ordering::SeqCst);
        let key = format!("{}{}", self.prefix_for(Generation::Staging), path);
        Ok(Box::new(ChecksumSink::new(
            Box::new(S3Sink {
                client: self.client.clone(),
                bucket: self.bucket.clone(),
                key,
                buffer: BytesMut::new(),
                upload_id: None,
                parts: Vec::new(),
                part_number: 0,
            }),
            expected,
        )))
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn recycle(&self, path: &str) -> StorageResult<()> {
        self.dirty.store(true, Ordering::SeqCst);
        let source = format!(
            "{}/{}{}",
            self.bucket,
            self.prefix_for(Generation::Permanent),
            path
        );
        let key = format!("{}{}", self.prefix_for(Generation::Staging), path);

        match self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(&source)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err
                    .meta()
                    .code()
                    .is_some_and(|code| code == "NoSuchKey")
                {
                    Err(StorageError::NotFound(path.to_string()))
                } else {
                    Err(s3_err(service_err))
                }
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket, region = %self.region))]
    async fn commit(&self) -> StorageResult<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let retired = self.current_prefix.lock().unwrap().clone();
        let promoted = other_prefix(&retired).to_string();

        // Readers switch generations the moment the routing rule flips;
        // in-flight GETs on the retired prefix stay valid until the delete
        // sweep below reaches their keys.
        configure_website(&self.client, &self.bucket, &promoted).await?;

        let mut continuation: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&retired);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let listing = request
                .send()
                .await
                .map_err(|err| s3_err(err.into_service_error()))?;

            let mut objects = Vec::new();
            for object in listing.contents() {
                if let Some(key) = object.key() {
                    objects.push(ObjectIdentifier::builder().key(key).build().map_err(s3_err)?);
                }
            }
            if !objects.is_empty() {
                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(
                        Delete::builder()
                            .set_objects(Some(objects))
                            .build()
                            .map_err(s3_err)?,
                    )
                    .send()
                    .await
                    .map_err(|err| s3_err(err.into_service_error()))?;
            }

            if listing.is_truncated() == Some(true) {
                continuation = listing.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        *self.current_prefix.lock().unwrap() = promoted;
        Ok(())
    }
}

/// Streaming upload into the staging prefix. Small files become a single
/// `PutObject`; larger ones switch to a multipart upload once the first part
/// fills.
struct S3Sink {
    client: Client,
    bucket: String,
    key: String,
    buffer: BytesMut,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    part_number: i32,
}

impl S3Sink {
    async fn upload_part(&mut self, data: Bytes) -> stillage_core::Result<()> {
        let upload_id = match &self.upload_id {
            Some(id) => id.clone(),
            None => {
                let created = self
                    .client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .send()
                    .await
                    .map_err(to_io)?;
                let id = created
                    .upload_id()
                    .ok_or_else(|| to_io_msg("multipart upload without an upload id"))?
                    .to_string();
                self.upload_id = Some(id.clone());
                id
            }
        };

        self.part_number += 1;
        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .part_number(self.part_number)
            .body(data.into())
            .send()
            .await
            .map_err(to_io)?;

        self.parts.push(
            CompletedPart::builder()
                .part_number(self.part_number)
                .set_e_tag(uploaded.e_tag().map(str::to_string))
                .build(),
        );
        Ok(())
    }
}

fn to_io<E>(err: E) -> stillage_core::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    stillage_core::Error::Io(std::io::Error::other(err))
}

fn to_io_msg(msg: &str) -> stillage_core::Error {
    stillage_core::Error::Io(std::io::Error::other(msg.to_string()))
}

#[async_trait]
impl ByteSink for S3Sink {
    async fn write(&mut self, data: Bytes) -> stillage_core::Result<()> {
        self.buffer.extend_from_slice(&data);
        while self.buffer.len() >= PART_SIZE {
            let part = self.buffer.split_to(PART_SIZE).freeze();
            self.upload_part(part).await?;
        }
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> stillage_core::Result<()> {
        match self.upload_id.clone() {
            None => {
                // Everything fit in the buffer: single-shot upload.
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .body(self.buffer.freeze().into())
                    .send()
                    .await
                    .map_err(to_io)?;
                Ok(())
            }
            Some(upload_id) => {
                if !self.buffer.is_empty() {
                    let rest = std::mem::take(&mut self.buffer).freeze();
                    self.upload_part(rest).await?;
                }
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(std::mem::take(&mut self.parts)))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(to_io)?;
                Ok(())
            }
        }
    }
}
