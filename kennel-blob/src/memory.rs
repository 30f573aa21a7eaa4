use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::{BlobError, BlobResult, ObjectInfo, ObjectStore};

#[derive(Default)]
struct Inner {
    buckets: RwLock<HashMap<String, BTreeMap<String, (ObjectInfo, Vec<u8>)>>>,
    uploads: AtomicUsize,
}

/// In-memory object store for tests and local development.
#[derive(Clone)]
pub struct MemoryObjectStore {
    label: String,
    inner: Arc<Inner>,
}

impl MemoryObjectStore {
    /// `label` shows up in public URLs so tests can tell stores apart.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            inner: Arc::new(Inner::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn upload_count(&self) -> usize {
        self.inner.uploads.load(Ordering::SeqCst)
    }

    /// Raw bytes of an object, if present.
    pub fn read(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.inner
            .buckets
            .read()
            .get(bucket)
            .and_then(|objects| objects.get(path))
            .map(|(_, body)| body.clone())
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> BlobResult<Vec<ObjectInfo>> {
        Ok(self
            .inner
            .buckets
            .read()
            .get(bucket)
            .map(|objects| {
                objects
                    .range(prefix.to_string()..)
                    .take_while(|(path, _)| path.starts_with(prefix))
                    .map(|(_, (info, _))| info.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> BlobResult<ObjectInfo> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(BlobError::invalid("object path is empty"));
        }
        let info = ObjectInfo {
            name: path.to_string(),
            size_bytes: body.len() as u64,
            content_type: content_type.map(str::to_string),
            updated_at: Some(Utc::now()),
        };
        self.inner
            .buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(path.to_string(), (info.clone(), body));
        self.inner.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(info)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> BlobResult<Vec<String>> {
        let mut buckets = self.inner.buckets.write();
        let Some(objects) = buckets.get_mut(bucket) else {
            return Ok(Vec::new());
        };
        Ok(paths
            .iter()
            .filter(|path| objects.remove(path.trim_start_matches('/')).is_some())
            .cloned()
            .collect())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{}/{}/{}", self.label, bucket, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buckets_are_isolated() {
        let store = MemoryObjectStore::new("default");
        store
            .upload("internal", "t1/a.txt", b"hello".to_vec(), Some("text/plain"))
            .await
            .unwrap();

        assert_eq!(store.list("internal", "t1/").await.unwrap().len(), 1);
        assert!(store.list("external", "t1/").await.unwrap().is_empty());
        assert!(store.list("internal", "t2/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_reports_existing_paths() {
        let store = MemoryObjectStore::default();
        store.upload("b", "x", vec![1, 2], None).await.unwrap();

        let removed = store
            .remove("b", &["x".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, vec!["x".to_string()]);
        assert!(store.read("b", "x").is_none());
    }
}
