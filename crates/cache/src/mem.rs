use async_trait::async_trait;
use dashmap::DashMap;
use kaipan_core::cache::error::CacheError;
use kaipan_core::cache::port::Cache;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct Entry {
    value: Vec<u8>,
    inserted_at: Instant,
}

/// # Summary
/// 基于 DashMap 的有界 TTL 内存缓存实现。
///
/// # Invariants
/// - 所有操作均通过并发哈希表 `DashMap` 执行，保证多线程安全。
/// - 读取时惰性淘汰过期条目，过期数据永远不会被返回。
/// - 条目数不超过 `capacity`；写满时先清理过期条目，仍不足则淘汰最早写入的条目。
pub struct MemCache {
    // 线程安全的 KV 存储容器
    storage: DashMap<String, Entry>,
    ttl: Duration,
    capacity: usize,
}

impl MemCache {
    /// # Summary
    /// 创建一个新的 MemCache 实例。
    ///
    /// # Arguments
    /// * `ttl`: 条目存活时长。
    /// * `capacity`: 条目上限，传 0 时按 1 处理。
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            storage: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) >= self.ttl
    }

    /// 写入前腾出空间
    fn make_room(&self, now: Instant) {
        if self.storage.len() < self.capacity {
            return;
        }
        self.storage.retain(|_, entry| !self.is_expired(entry, now));

        while self.storage.len() >= self.capacity {
            let oldest = self
                .storage
                .iter()
                .min_by_key(|item| item.value().inserted_at)
                .map(|item| item.key().clone());
            match oldest {
                Some(key) => {
                    debug!(key = %key, "cache full, evicting oldest entry");
                    self.storage.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl Cache for MemCache {
    /// # Summary
    /// 设置原始字节数据。
    ///
    /// # Logic
    /// 1. 新键且容量已满时先腾出空间。
    /// 2. 插入并记录写入时刻，同名键被覆盖且重新计时。
    async fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let now = Instant::now();
        if !self.storage.contains_key(key) {
            self.make_room(now);
        }
        self.storage.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: now,
            },
        );
        Ok(())
    }

    /// # Summary
    /// 获取原始字节数据。
    ///
    /// # Logic
    /// 命中且未过期则返回克隆；已过期则移除并视为未命中。
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let hit = match self.storage.get(key) {
            Some(entry) if !self.is_expired(entry.value(), now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if hit.is_none() {
            self.storage
                .remove_if(key, |_, entry| self.is_expired(entry, now));
        }
        Ok(hit)
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.storage.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.storage.clear();
        Ok(())
    }
}
