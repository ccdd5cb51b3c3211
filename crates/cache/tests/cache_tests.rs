use kaipan_cache::mem::MemCache;
use kaipan_core::cache::port::{Cache, CacheExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct TestItem {
    id: u32,
    name: String,
}

#[tokio::test]
async fn test_mem_cache_raw_ops() {
    let cache = MemCache::new(Duration::from_secs(60), 16);
    let key = "raw_key";
    let value = vec![1, 2, 3, 4];

    // 测试存取
    cache.set_raw(key, value.clone()).await.unwrap();
    let result = cache.get_raw(key).await.unwrap().unwrap();
    assert_eq!(result, value);

    // 测试删除
    cache.del(key).await.unwrap();
    let result = cache.get_raw(key).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_mem_cache_typed_ops() {
    let cache = MemCache::new(Duration::from_secs(60), 16);
    let item = TestItem {
        id: 42,
        name: "Kaipan".to_string(),
    };

    cache.set("typed_key", &item).await.unwrap();

    let result: TestItem = cache.get("typed_key").await.unwrap().unwrap();
    assert_eq!(result, item);
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_ttl() {
    let cache = MemCache::new(Duration::from_secs(2), 16);
    cache.set_raw("quote:000001.SZ", vec![7]).await.unwrap();

    tokio::time::advance(Duration::from_millis(1500)).await;
    assert_eq!(cache.get_raw("quote:000001.SZ").await.unwrap(), Some(vec![7]));

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(cache.get_raw("quote:000001.SZ").await.unwrap().is_none());
    // 过期条目在读取时被移除
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_overwrite_resets_ttl() {
    let cache = MemCache::new(Duration::from_secs(2), 16);
    cache.set_raw("k", vec![1]).await.unwrap();
    tokio::time::advance(Duration::from_millis(1500)).await;
    cache.set_raw("k", vec![2]).await.unwrap();
    tokio::time::advance(Duration::from_millis(1500)).await;
    assert_eq!(cache.get_raw("k").await.unwrap(), Some(vec![2]));
}

#[tokio::test(start_paused = true)]
async fn test_capacity_evicts_oldest() {
    let cache = MemCache::new(Duration::from_secs(60), 2);
    cache.set_raw("a", vec![1]).await.unwrap();
    tokio::time::advance(Duration::from_millis(10)).await;
    cache.set_raw("b", vec![2]).await.unwrap();
    tokio::time::advance(Duration::from_millis(10)).await;
    cache.set_raw("c", vec![3]).await.unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.get_raw("a").await.unwrap().is_none());
    assert_eq!(cache.get_raw("b").await.unwrap(), Some(vec![2]));
    assert_eq!(cache.get_raw("c").await.unwrap(), Some(vec![3]));
}

#[tokio::test]
async fn test_clear_drops_everything() {
    let cache = MemCache::new(Duration::from_secs(60), 16);
    cache.set_raw("a", vec![1]).await.unwrap();
    cache.set_raw("b", vec![2]).await.unwrap();
    cache.clear().await.unwrap();
    assert!(cache.is_empty());
}
