//! Blob Filesystem Adapter
//!
//! Thin wrapper over the data directory: blobs are written once, named by
//! their hex SHA-256, and never rewritten or deleted.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct BlobStore {
    data_dir: PathBuf,
}

impl BlobStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, BlobStoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn storage_path(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, sha256_hex: &str) -> PathBuf {
        self.data_dir.join(sha256_hex)
    }

    pub async fn write_blob(&self, sha256_hex: &str, bytes: Vec<u8>) -> Result<(), BlobStoreError> {
        let path = self.path_for(sha256_hex);
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    pub async fn read_blob(&self, sha256_hex: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.path_for(sha256_hex);
        Ok(tokio::fs::read(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_reads_back_bytes() {
        let dir = std::env::temp_dir().join(format!("blossom-cashu-test-{:p}", &0));
        let store = BlobStore::new(&dir).unwrap();

        store.write_blob("deadbeef", b"hello blob".to_vec()).await.unwrap();
        let bytes = store.read_blob("deadbeef").await.unwrap();

        assert_eq!(bytes, b"hello blob");
        std::fs::remove_dir_all(&dir).ok();
    }
}
