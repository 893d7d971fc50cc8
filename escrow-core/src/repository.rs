use crate::Error;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A record with an opaque identifier assigned at creation time.
pub trait Identified {
    fn id(&self) -> Uuid;
}

impl Identified for crate::Contract {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Identified for crate::Execution {
    fn id(&self) -> Uuid {
        self.external_id
    }
}

impl Identified for crate::Arbitration {
    fn id(&self) -> Uuid {
        self.external_id
    }
}

/// Storage abstraction the orchestrators depend on. `find_by_external_id` is kept distinct
/// from `find_by_id` in the interface even though this design's opaque ids make them
/// equivalent in practice, so a persistence-backed implementation remains free to use an
/// internal primary key different from the externally visible id.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Identified + Clone + Send + Sync,
{
    async fn save(&self, item: T) -> Result<(), Error>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<T>, Error>;
    async fn find_by_external_id(&self, id: Uuid) -> Result<Option<T>, Error> {
        self.find_by_id(id).await
    }
}

/// An in-memory repository over a single mutex-guarded map, mirroring the shape of
/// `InMemorySwapStorage`.
pub struct InMemoryRepository<T> {
    items: Arc<Mutex<HashMap<Uuid, T>>>,
}

impl<T> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Identified + Clone + Send + Sync,
{
    async fn save(&self, item: T) -> Result<(), Error> {
        let mut items = self.items.lock().await;
        items.insert(item.id(), item);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<T>, Error> {
        let items = self.items.lock().await;
        Ok(items.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Item {
        id: Uuid,
        value: u32,
    }

    impl Identified for Item {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    #[tokio::test]
    async fn save_then_find_round_trips() {
        let repo: InMemoryRepository<Item> = InMemoryRepository::new();
        let id = Uuid::new_v4();
        repo.save(Item { id, value: 7 }).await.unwrap();
        let found = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.value, 7);
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let repo: InMemoryRepository<Item> = InMemoryRepository::new();
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}
