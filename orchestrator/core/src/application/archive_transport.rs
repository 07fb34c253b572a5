// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Archive Transport
//!
//! Streams a gzip-compressed tarball of the agent's mounted volume out through
//! the exec channel into a local file.
//!
//! The remote pipeline appends 1 MiB of zeros to the tar stream before
//! compressing it and sleeps before exiting, so the last compressed bytes are
//! flushed through the channel before it closes. Afterwards the local file is
//! decoded in full: the gzip member must end with a valid CRC32 and size
//! trailer, and the decompressed stream must be whole tar blocks ending in the
//! complete zero padding. Anything else is reported as
//! [`BackupError::Truncated`].

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;

use flate2::read::GzDecoder;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::application::output_files;
use crate::domain::agent::{AgentHandle, AGENT_CONTAINER, AGENT_MOUNT_PATH};
use crate::domain::cluster::{ClusterAccess, ExecSession};
use crate::domain::download::OutputLayout;
use crate::domain::error::BackupError;
use crate::domain::manifest::{sanitized, to_yaml};
use crate::domain::volume::ResolvedVolume;

/// Zero bytes appended after the tar stream
pub const ARCHIVE_PADDING_BYTES: u64 = 1024 * 1024;

const TAR_BLOCK_SIZE: u64 = 512;
const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// Remote shell pipeline producing the compressed archive on stdout.
pub fn archive_command() -> Vec<String> {
    let script = format!(
        "set -o pipefail; (tar -cf - -C {mount} . && dd if=/dev/zero bs=1024 count={blocks} status=none) | gzip -4cf; rc=$?; sleep 5; exit $rc",
        mount = AGENT_MOUNT_PATH,
        blocks = ARCHIVE_PADDING_BYTES / 1024,
    );
    vec!["bash".to_string(), "-c".to_string(), script]
}

pub struct ArchiveTransport {
    cluster: Arc<dyn ClusterAccess>,
}

impl ArchiveTransport {
    pub fn new(cluster: Arc<dyn ClusterAccess>) -> Self {
        Self { cluster }
    }

    /// Write the volume and claim manifests next to where the archive will go.
    pub async fn write_manifests(&self, resolved: &ResolvedVolume, layout: &OutputLayout) -> Result<(), BackupError> {
        output_files::create_dir(&layout.dir).await?;

        let volume = to_yaml(&sanitized(&resolved.volume))?;
        output_files::write_file(&layout.volume_manifest(), volume).await?;

        if let Some(claim) = &resolved.claim {
            let claim = to_yaml(&sanitized(claim))?;
            output_files::write_file(&layout.claim_manifest(), claim).await?;
        }

        debug!("Manifests for volume {} written to {}", layout.volume, layout.dir.display());
        Ok(())
    }

    /// Stream the archive out of `agent` into `layout.archive()`.
    ///
    /// Returns the number of bytes written.
    pub async fn stream(&self, agent: &AgentHandle, layout: &OutputLayout) -> Result<u64, BackupError> {
        output_files::create_dir(&layout.dir).await?;
        let path = layout.archive();

        info!("Downloading volume {} with tar exec", layout.volume);
        let ExecSession {
            mut stdout,
            stderr,
            completion,
        } = self
            .cluster
            .exec(&agent.namespace, &agent.name, AGENT_CONTAINER, archive_command())
            .await
            .map_err(|e| BackupError::Transport(format!("cannot open exec channel to {}: {}", agent, e)))?;

        let mut writer = BufWriter::new(output_files::create_file(&path).await?);

        let copy_stdout = async {
            let bytes = tokio::io::copy(&mut stdout, &mut writer).await?;
            writer.flush().await?;
            Ok::<u64, std::io::Error>(bytes)
        };
        let copy_stderr = async {
            if let Some(mut stderr) = stderr {
                tokio::io::copy(&mut stderr, &mut tokio::io::stderr()).await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (bytes, ()) = tokio::try_join!(copy_stdout, copy_stderr)
            .map_err(|e| BackupError::Transport(format!("stream from {} interrupted: {}", agent, e)))?;

        completion
            .await
            .map_err(|e| BackupError::Transport(format!("archive command in {} failed: {}", agent, e)))?;

        writer.into_inner().sync_all().await?;
        verify_archive(&path, bytes).await?;

        info!("Volume {} downloaded ({} bytes)", layout.volume, bytes);
        Ok(bytes)
    }
}

/// What decoding a received archive found.
#[derive(Debug, Default, PartialEq, Eq)]
struct ArchiveScan {
    decompressed: u64,
    trailing_zeros: u64,
}

impl ArchiveScan {
    fn is_complete(&self) -> bool {
        self.decompressed % TAR_BLOCK_SIZE == 0 && self.trailing_zeros >= ARCHIVE_PADDING_BYTES
    }
}

/// Decode a received archive end to end.
///
/// `bytes` is only used to describe the failure.
pub async fn verify_archive(path: &Path, bytes: u64) -> Result<(), BackupError> {
    let truncated = || BackupError::Truncated {
        path: path.to_path_buf(),
        bytes,
    };

    let file = path.to_path_buf();
    let scan = tokio::task::spawn_blocking(move || scan_archive(&file))
        .await
        .map_err(|e| BackupError::Pool(format!("archive check for {} aborted: {}", path.display(), e)))?;

    match scan {
        Ok(scan) if scan.is_complete() => Ok(()),
        Ok(scan) => {
            debug!(
                "Archive {} decoded to {} bytes with {} trailing zero bytes",
                path.display(),
                scan.decompressed,
                scan.trailing_zeros
            );
            Err(truncated())
        }
        Err(e) if matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::InvalidData | ErrorKind::InvalidInput) => {
            debug!("Archive {} does not decode: {}", path.display(), e);
            Err(truncated())
        }
        Err(e) => Err(e.into()),
    }
}

fn scan_archive(path: &Path) -> std::io::Result<ArchiveScan> {
    let mut decoder = GzDecoder::new(std::fs::File::open(path)?);
    let mut buf = vec![0u8; SCAN_BUFFER_SIZE];
    let mut scan = ArchiveScan::default();

    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        scan.decompressed += n as u64;
        match buf[..n].iter().rposition(|b| *b != 0) {
            Some(last) => scan.trailing_zeros = (n - last - 1) as u64,
            None => scan.trailing_zeros += n as u64,
        }
    }

    Ok(scan)
}
