use crate::retry::{RetryPolicy, with_backoff};
use kaipan_core::cache::port::{Cache, CacheExt};
use kaipan_core::common::ParsedSymbol;
use kaipan_core::market::entity::Quote;
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::QuoteProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

fn cache_key(symbol: &str) -> String {
    format!("quote:{}", symbol)
}

/// # Summary
/// 实时报价服务，按证券逐只缓存。
///
/// # Invariants
/// - 缓存命中的标的不会触发上游请求；未命中的标的合并为一次批量请求。
/// - 返回顺序与请求顺序一致，上游未返回的标的被省略。
pub struct QuoteService {
    provider: Arc<dyn QuoteProvider>,
    cache: Arc<dyn Cache>,
    retry: RetryPolicy,
}

impl QuoteService {
    pub fn new(provider: Arc<dyn QuoteProvider>, cache: Arc<dyn Cache>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            cache,
            retry,
        }
    }

    /// # Summary
    /// 批量获取报价。
    ///
    /// # Logic
    /// 1. 解析并去重证券代码，非法代码直接报错。
    /// 2. 逐只查询缓存，收集未命中列表。
    /// 3. 未命中部分一次性请求上游并回填缓存。
    ///
    /// # Returns
    /// 请求非空但一个报价都拿不到时返回 `NoData`。
    pub async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketError> {
        let mut parsed: Vec<ParsedSymbol> = Vec::new();
        for raw in symbols {
            let p = ParsedSymbol::parse(raw.trim())
                .map_err(|e| MarketError::InvalidRequest(e.to_string()))?;
            if !parsed.contains(&p) {
                parsed.push(p);
            }
        }
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<String, Quote> = HashMap::new();
        let mut missing: Vec<ParsedSymbol> = Vec::new();
        for p in &parsed {
            let name = p.symbol();
            match self.cache.get::<Quote>(&cache_key(&name)).await {
                Ok(Some(q)) => {
                    found.insert(name, q);
                }
                Ok(None) => missing.push(p.clone()),
                Err(e) => {
                    warn!(symbol = %name, error = %e, "quote cache read failed");
                    missing.push(p.clone());
                }
            }
        }
        debug!(hits = found.len(), misses = missing.len(), "quote cache lookup");

        if !missing.is_empty() {
            let fetched = with_backoff(self.retry, "quotes", || self.provider.fetch_quotes(&missing))
                .await
                .map_err(|e| {
                    warn!(error = %e, "quote upstream exhausted");
                    MarketError::NoData(format!("quotes unavailable: {}", e))
                });
            match fetched {
                Ok(quotes) => {
                    for q in quotes {
                        if let Err(e) = self.cache.set(&cache_key(&q.symbol), &q).await {
                            warn!(symbol = %q.symbol, error = %e, "quote cache write failed");
                        }
                        found.insert(q.symbol.clone(), q);
                    }
                }
                Err(e) if found.is_empty() => return Err(e),
                Err(_) => {}
            }
        }

        let quotes: Vec<Quote> = parsed
            .iter()
            .filter_map(|p| found.remove(&p.symbol()))
            .collect();
        if quotes.is_empty() {
            return Err(MarketError::NoData(format!(
                "no quote for {}",
                symbols.join(",")
            )));
        }
        Ok(quotes)
    }

    /// 显式失效单只证券的报价缓存
    pub async fn invalidate(&self, symbol: &str) -> Result<(), MarketError> {
        self.cache
            .del(&cache_key(symbol))
            .await
            .map_err(|e| MarketError::Unknown(e.to_string()))
    }
}
