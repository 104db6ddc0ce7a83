/// A macro to simplify response caching.
///
/// Looks the key up in the cache and returns the cached value on a hit. On a miss the
/// provided future is awaited; a successful value is stored under the key and returned,
/// an error is propagated with `?` and never cached.
///
/// # Arguments
/// * `$cache`: The cache instance. It must have `get` and `put` methods.
/// * `$key`: The [`CacheKey`](crate::cache::CacheKey) to look up and store under.
/// * `$block`: The future computing the value on a miss.
///
/// # Example
/// ```rust,ignore
/// let response = cached!(self.cache, CacheKey::from_request(&request)?, async move {
///     compute_expensive_value().await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        let key = $key;
        if let Some(cached) = $cache.get(&key) {
            tracing::debug!("Serving response from cache");
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.put(&key, &value);
            Ok(value)
        }
    }};
}
