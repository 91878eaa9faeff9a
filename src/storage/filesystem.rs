//! Filesystem-backed image store

use super::naming::resolve_target_name;
use super::traits::{FilenamePolicy, ImageStore, PutRequest, StoreError};
use crate::types::{has_image_extension, is_safe_filename, Category};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, instrument};

/// ENOSPC raw error code on Linux and macOS.
const ENOSPC: i32 = 28;

/// Convert an io::Error into StoreError, detecting disk-full (ENOSPC).
fn io_to_store_error(e: std::io::Error) -> StoreError {
    if e.raw_os_error() == Some(ENOSPC) {
        StoreError::DiskFull
    } else {
        StoreError::Io(e)
    }
}

/// Write `data` to a temp file next to `path`, fsync, then link it into place
/// only if `path` does not exist yet. Two uploads racing for the same name
/// cannot both win.
async fn write_new_file(path: &Path, data: Bytes) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Other("Cannot write to a path with no parent".into()))?
        .to_path_buf();
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut tmp = NamedTempFile::new_in(&parent).map_err(io_to_store_error)?;
        tmp.write_all(&data).map_err(io_to_store_error)?;
        tmp.as_file().sync_all().map_err(io_to_store_error)?;
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                StoreError::AlreadyExists(
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                )
            } else {
                io_to_store_error(e.error)
            }
        })?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Other(format!("spawn_blocking join failed: {}", e)))?
}

/// Filesystem image store
///
/// Storage layout:
/// ```text
/// {root}/public/{filename}
/// {root}/private/{filename}
/// ```
pub struct FilesystemStore {
    root: PathBuf,
    policy: FilenamePolicy,
}

impl FilesystemStore {
    /// Create the store, making sure both category directories exist.
    pub async fn new(root: PathBuf, policy: FilenamePolicy) -> Result<Self, StoreError> {
        for category in Category::ALL {
            fs::create_dir_all(root.join(category.as_str())).await?;
        }
        Ok(Self { root, policy })
    }

    fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.as_str())
    }

    /// Path of an existing-or-not image. Unsafe names resolve to nothing.
    fn image_path(&self, category: Category, filename: &str) -> Option<PathBuf> {
        is_safe_filename(filename).then(|| self.category_dir(category).join(filename))
    }

    /// Resolve a name for reading or deleting: it must be safe and name a
    /// regular file. Symlinks are not followed, so a link cannot reach
    /// outside the category directory.
    async fn existing_file(&self, category: Category, filename: &str) -> Result<PathBuf, StoreError> {
        let not_found = || StoreError::NotFound(format!("{}/{}", category, filename));
        let path = self.image_path(category, filename).ok_or_else(not_found)?;
        match fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(not_found()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(io_to_store_error(e)),
        }
    }
}

#[async_trait]
impl ImageStore for FilesystemStore {
    #[instrument(skip(self))]
    async fn list(&self, category: Category) -> Result<Vec<String>, StoreError> {
        let mut entries = fs::read_dir(self.category_dir(category)).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                if has_image_extension(&name) {
                    names.push(name);
                }
            }
        }
        debug!("Listed {} images in {}", names.len(), category);
        Ok(names)
    }

    #[instrument(skip(self, request), fields(size = request.data.len()))]
    async fn put(&self, category: Category, request: PutRequest) -> Result<String, StoreError> {
        let name = resolve_target_name(self.policy, &request)?;
        let path = self
            .image_path(category, &name)
            .ok_or_else(|| StoreError::InvalidName(name.clone()))?;

        write_new_file(&path, request.data).await?;
        debug!("Stored {}/{}", category, name);
        Ok(name)
    }

    #[instrument(skip(self))]
    async fn get(&self, category: Category, filename: &str) -> Result<Bytes, StoreError> {
        let path = self.existing_file(category, filename).await?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::NotFound(format!("{}/{}", category, filename))
            } else {
                io_to_store_error(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self))]
    async fn delete(&self, category: Category, filename: &str) -> Result<(), StoreError> {
        let path = self.existing_file(category, filename).await?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::NotFound(format!("{}/{}", category, filename))
            } else {
                io_to_store_error(e)
            }
        })?;
        debug!("Deleted {}/{}", category, filename);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(policy: FilenamePolicy) -> (FilesystemStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf(), policy)
            .await
            .unwrap();
        (store, dir)
    }

    fn png(name: &str, data: &'static [u8]) -> PutRequest {
        PutRequest {
            original_name: Some(name.to_string()),
            content_type: Some("image/png".to_string()),
            requested_name: None,
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn test_creates_category_dirs() {
        let (store, dir) = store(FilenamePolicy::Preserve).await;
        assert!(dir.path().join("public").is_dir());
        assert!(dir.path().join("private").is_dir());
        assert!(store.list(Category::Public).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let (store, _dir) = store(FilenamePolicy::Preserve).await;
        let name = store
            .put(Category::Private, png("secret.png", b"private-bytes"))
            .await
            .unwrap();
        assert_eq!(name, "secret.png");

        assert_eq!(
            store.get(Category::Private, "secret.png").await.unwrap(),
            Bytes::from_static(b"private-bytes")
        );
        assert_eq!(store.list(Category::Private).await.unwrap(), vec!["secret.png"]);
        assert!(store.list(Category::Public).await.unwrap().is_empty());
        assert!(matches!(
            store.get(Category::Public, "secret.png").await,
            Err(StoreError::NotFound(_))
        ));

        store.delete(Category::Private, "secret.png").await.unwrap();
        assert!(store.list(Category::Private).await.unwrap().is_empty());
        assert!(matches!(
            store.delete(Category::Private, "secret.png").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let (store, _dir) = store(FilenamePolicy::Preserve).await;
        store
            .put(Category::Public, png("cat.png", b"original"))
            .await
            .unwrap();
        let err = store
            .put(Category::Public, png("cat.png", b"replacement"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(ref n) if n == "cat.png"));
        assert_eq!(
            store.get(Category::Public, "cat.png").await.unwrap(),
            Bytes::from_static(b"original")
        );
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_name_single_winner() {
        let (store, _dir) = store(FilenamePolicy::Preserve).await;
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(Category::Public, png("race.png", b"data")).await
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_list_filters_non_images() {
        let (store, dir) = store(FilenamePolicy::Preserve).await;
        let public = dir.path().join("public");
        std::fs::write(public.join("a.png"), b"x").unwrap();
        std::fs::write(public.join("b.JPG"), b"x").unwrap();
        std::fs::write(public.join("notes.txt"), b"x").unwrap();
        std::fs::write(public.join("logo.svg"), b"x").unwrap();
        std::fs::create_dir(public.join("dir.png")).unwrap();

        let mut names = store.list(Category::Public).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a.png", "b.JPG"]);
    }

    #[tokio::test]
    async fn test_traversal_is_not_found() {
        let (store, dir) = store(FilenamePolicy::Preserve).await;
        std::fs::write(dir.path().join("private").join("secret.png"), b"s").unwrap();
        std::fs::write(dir.path().join("outside.png"), b"o").unwrap();

        for name in ["../private/secret.png", "../outside.png", "..", "/etc/passwd"] {
            assert!(
                matches!(
                    store.get(Category::Public, name).await,
                    Err(StoreError::NotFound(_))
                ),
                "{name} should not resolve"
            );
            assert!(matches!(
                store.delete(Category::Public, name).await,
                Err(StoreError::NotFound(_))
            ));
        }
        assert!(dir.path().join("outside.png").exists());
    }

    #[tokio::test]
    async fn test_random_policy_names() {
        let (store, _dir) = store(FilenamePolicy::Random).await;
        let a = store
            .put(Category::Public, png("cat.png", b"1"))
            .await
            .unwrap();
        let b = store
            .put(Category::Public, png("cat.png", b"2"))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with(".png") && b.ends_with(".png"));
        assert_eq!(store.list(Category::Public).await.unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_is_not_followed() {
        let (store, dir) = store(FilenamePolicy::Preserve).await;
        let outside = dir.path().join("outside.png");
        std::fs::write(&outside, b"outside").unwrap();
        let link = dir.path().join("private").join("link.png");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        assert!(matches!(
            store.get(Category::Private, "link.png").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(Category::Private, "link.png").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.list(Category::Private).await.unwrap().is_empty());
        assert!(outside.exists());
        assert!(link.symlink_metadata().is_ok());
    }
}
