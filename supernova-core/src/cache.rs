use std::collections::HashMap;

use tokio::sync::RwLock;

/// City name to provider location key.
///
/// Keys are normalized to lowercase so "London" and "LONDON" share an entry.
/// Entries live as long as the cache; there is no eviction.
#[derive(Debug, Default)]
pub struct LocationCache {
    entries: RwLock<HashMap<String, String>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, city: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries.get(&normalize(city)).cloned()
    }

    pub async fn insert(&self, city: &str, location_key: String) {
        let mut entries = self.entries.write().await;
        entries.insert(normalize(city), location_key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn normalize(city: &str) -> String {
    city.trim().to_lowercase()
}
