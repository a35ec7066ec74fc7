//! Size-bounded part files for raw stream capture.
//!
//! A [`PartWriter`] owns the capture state of one stream task: the number of the
//! current part, the bytes written into it and its open file. It is never shared;
//! the capture loop holds it by exclusive reference.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::{DownloadError, path::part_path};

const WRITE_BUFFER_SIZE: usize = 256 * 1024;

struct OpenPart {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// A part file that has been flushed and closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedPart {
    pub number: u64,
    pub path: PathBuf,
    pub bytes: u64,
}

pub struct PartWriter {
    prefix: PathBuf,
    max_part_size: u64,
    // Number of the part currently (or most recently) open; 0 before the first one.
    part_number: u64,
    bytes_in_part: u64,
    current: Option<OpenPart>,
}

impl PartWriter {
    /// A `max_part_size` of 0 is raised to 1 byte.
    pub fn new(prefix: impl Into<PathBuf>, max_part_size: u64) -> Self {
        Self {
            prefix: prefix.into(),
            max_part_size: max_part_size.max(1),
            part_number: 0,
            bytes_in_part: 0,
            current: None,
        }
    }

    pub fn part_number(&self) -> u64 {
        self.part_number
    }

    pub fn bytes_in_part(&self) -> u64 {
        self.bytes_in_part
    }

    /// Close the open part (if any) and create the next one.
    ///
    /// The part number advances and the byte counter resets only when the new file
    /// was created, so a failed create never burns or repeats a number.
    pub async fn start_part(&mut self) -> Result<&Path, DownloadError> {
        self.close().await;

        let next = self.part_number + 1;
        let path = part_path(&self.prefix, next);
        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io_path("creating part file", &path, e))?;

        self.part_number = next;
        self.bytes_in_part = 0;
        debug!(part = next, path = %path.display(), "Opened part file");

        let part = self.current.insert(OpenPart {
            path,
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
        });
        Ok(part.path.as_path())
    }

    /// Append `data`, rotating to a new part whenever the current one is full.
    ///
    /// Chunks are split at the size limit, so no part ever holds more than
    /// `max_part_size` bytes. Rotation is lazy: the next part is only created once
    /// there is a byte to put in it. Write failures are logged and the bytes are
    /// dropped; only a failure to create the next part is returned.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<(), DownloadError> {
        while !data.is_empty() {
            if self.current.is_none() || self.bytes_in_part >= self.max_part_size {
                let previous = self.part_number;
                self.start_part().await?;
                if previous > 0 {
                    info!(
                        from = previous,
                        to = self.part_number,
                        "Part size limit reached, rotated part file"
                    );
                }
            }

            let room = self.max_part_size - self.bytes_in_part;
            let take = usize::try_from(room).map_or(data.len(), |room| room.min(data.len()));
            let (head, tail) = data.split_at(take);

            if let Some(part) = self.current.as_mut()
                && let Err(e) = part.writer.write_all(head).await
            {
                warn!(
                    path = %part.path.display(),
                    bytes = head.len(),
                    error = %e,
                    "Failed to write to part file, data dropped"
                );
            }

            self.bytes_in_part += head.len() as u64;
            data = tail;
        }
        Ok(())
    }

    /// Flush and close the open part. Safe to call when nothing is open.
    pub async fn close(&mut self) -> Option<ClosedPart> {
        let OpenPart { path, mut writer } = self.current.take()?;

        if let Err(e) = writer.flush().await {
            warn!(path = %path.display(), error = %e, "Failed to flush part file");
        }
        if let Err(e) = writer.shutdown().await {
            warn!(path = %path.display(), error = %e, "Failed to close part file");
        }

        debug!(
            part = self.part_number,
            path = %path.display(),
            bytes = self.bytes_in_part,
            "Closed part file"
        );

        Some(ClosedPart {
            number: self.part_number,
            path,
            bytes: self.bytes_in_part,
        })
    }
}
