//! Remote MJPEG source: consumes a `multipart/x-mixed-replace` JPEG stream
//! over HTTP
//!
//! The HTTP client is async (reqwest); the pipeline thread drives it with
//! `Handle::block_on`, so every read blocks only the producer. Parts that
//! fail to decode are skipped; only transport errors, the end of the stream
//! and an oversized part fail a read.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::codec::decode_jpeg;
use super::frame::Frame;
use super::mjpeg::MjpegSplitter;
use super::source::{CaptureDevice, CaptureHandle, SourceError};
use crate::utils::{LogThrottler, ThrottleDecision};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// HTTP MJPEG endpoint, e.g. `http://camera-host:8000/video_feed`
pub struct RemoteMjpegDevice {
    url: String,
    client: reqwest::Client,
    runtime: Handle,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl RemoteMjpegDevice {
    pub fn new(
        url: impl Into<String>,
        runtime: Handle,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, SourceError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SourceError::connect(url.clone(), e))?;
        Ok(Self {
            url,
            client,
            runtime,
            connect_timeout,
            read_timeout,
        })
    }
}

impl CaptureDevice for RemoteMjpegDevice {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, SourceError> {
        let request = self.client.get(&self.url).send();
        let response = self
            .runtime
            .block_on(tokio::time::timeout(self.connect_timeout, request))
            .map_err(|_| SourceError::connect(self.url.clone(), "connect timed out"))?
            .map_err(|e| SourceError::connect(self.url.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::connect(
                self.url.clone(),
                format!("HTTP {}", status),
            ));
        }
        if let Some(content_type) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            debug!("Remote stream content type: {:?}", content_type);
        }
        info!("Streaming from {}", self.url);

        Ok(Box::new(RemoteMjpegHandle {
            url: self.url.clone(),
            runtime: self.runtime.clone(),
            stream: Box::pin(response.bytes_stream()),
            splitter: MjpegSplitter::new(),
            read_timeout: self.read_timeout,
            sequence: 0,
            skipped: 0,
            decode_errors: LogThrottler::with_secs(5),
        }))
    }
}

struct RemoteMjpegHandle {
    url: String,
    runtime: Handle,
    stream: ByteStream,
    splitter: MjpegSplitter,
    read_timeout: Duration,
    sequence: u64,
    /// Undecodable parts dropped on this connection
    skipped: u64,
    decode_errors: LogThrottler,
}

impl RemoteMjpegHandle {
    fn next_chunk(&mut self) -> Result<Bytes, SourceError> {
        let next = self
            .runtime
            .block_on(tokio::time::timeout(self.read_timeout, self.stream.next()));
        match next {
            Ok(Some(Ok(chunk))) => Ok(chunk),
            Ok(Some(Err(e))) => Err(SourceError::read(self.url.clone(), e)),
            Ok(None) => Err(SourceError::read(self.url.clone(), "stream ended")),
            Err(_) => Err(SourceError::read(
                self.url.clone(),
                format!("no data for {}s", self.read_timeout.as_secs_f32()),
            )),
        }
    }
}

impl CaptureHandle for RemoteMjpegHandle {
    fn read_frame(&mut self) -> Result<Frame, SourceError> {
        loop {
            let jpeg = self
                .splitter
                .next_jpeg()
                .map_err(|e| SourceError::read(self.url.clone(), e))?;
            if let Some(jpeg) = jpeg {
                match decode_jpeg(&jpeg) {
                    Ok(frame) => {
                        self.sequence += 1;
                        return Ok(frame.with_sequence(self.sequence));
                    }
                    Err(e) => {
                        self.skipped += 1;
                        if let ThrottleDecision::Log { suppressed } =
                            self.decode_errors.check("decode")
                        {
                            warn!(
                                "Skipping undecodable part from {} ({} bytes): {} \
                                 ({} skipped, {} not logged)",
                                self.url,
                                jpeg.len(),
                                e,
                                self.skipped,
                                suppressed
                            );
                        }
                        continue;
                    }
                }
            }
            let chunk = self.next_chunk()?;
            self.splitter.push(&chunk);
        }
    }
}
