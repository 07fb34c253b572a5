// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backup output on the local disk is readable by its owner only.

use std::path::Path;

use tokio::fs::{DirBuilder, File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const DIR_MODE: u32 = 0o700;
pub const FILE_MODE: u32 = 0o600;

/// `mkdir -p` with owner-only permissions on every created directory.
pub async fn create_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(path).await
}

/// Create or truncate `path` for writing.
pub async fn create_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);
    options.open(path).await
}

pub async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    let mut file = create_file(path).await?;
    file.write_all(contents.as_ref()).await?;
    file.flush().await
}
