use std::collections::HashMap;

use crate::models::Frame;

/// Latest image per logical key, read by the presentation layer.
///
/// Keys may arrive with a cache-busting `?query` suffix; only the part before
/// the first `?` identifies the image.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: HashMap<String, Frame>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize_key(key: &str) -> &str {
        match key.split_once('?') {
            Some((base, _)) => base,
            None => key,
        }
    }

    /// Store `frame` under `key`, replacing any previous image
    pub fn set(&mut self, key: &str, frame: Frame) {
        self.images.insert(Self::normalize_key(key).to_string(), frame);
    }

    pub fn get(&self, key: &str) -> Option<&Frame> {
        self.images.get(Self::normalize_key(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<Frame> {
        self.images.remove(Self::normalize_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.images.contains_key(Self::normalize_key(key))
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.images.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }
}
