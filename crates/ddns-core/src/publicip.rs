//! Public IP discovery composition
//!
//! The HTTP and DNS fetcher crates each implement [`PublicIpFetcher`]; this
//! module spreads calls across them. [`Ring`] is the lock-free round robin
//! both levels rely on.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::traits::PublicIpFetcher;

/// Round robin over a fixed list, advanced atomically on each call.
///
/// Under contention the order seen by concurrent callers is unspecified,
/// but after N calls every item was handed out ⌊N/K⌋ or ⌈N/K⌉ times.
#[derive(Debug)]
pub struct Ring<T> {
    items: Vec<T>,
    counter: AtomicUsize,
}

impl<T> Ring<T> {
    /// Create a ring, failing on an empty list
    pub fn new(items: Vec<T>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::config("cannot cycle over an empty list"));
        }
        Ok(Self {
            items,
            counter: AtomicUsize::new(0),
        })
    }

    /// Next item in the cycle
    pub fn next(&self) -> &T {
        &self.items[self.next_index()]
    }

    /// Index of the next item in the cycle
    pub fn next_index(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.items.len()
    }

    /// Item at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// All items, in cycle order
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false, an empty ring cannot be built
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Alternates between sub-fetchers (HTTP, DNS) on every call.
pub struct CyclingFetcher {
    fetchers: Ring<Arc<dyn PublicIpFetcher>>,
}

impl CyclingFetcher {
    /// Create a fetcher cycling over `fetchers`
    pub fn new(fetchers: Vec<Arc<dyn PublicIpFetcher>>) -> Result<Self> {
        Ok(Self {
            fetchers: Ring::new(fetchers)?,
        })
    }
}

#[async_trait]
impl PublicIpFetcher for CyclingFetcher {
    async fn ip(&self) -> Result<IpAddr> {
        self.fetchers.next().ip().await
    }

    async fn ip4(&self) -> Result<IpAddr> {
        self.fetchers.next().ip4().await
    }

    async fn ip6(&self) -> Result<IpAddr> {
        self.fetchers.next().ip6().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(IpAddr);

    #[async_trait]
    impl PublicIpFetcher for Constant {
        async fn ip(&self) -> Result<IpAddr> {
            Ok(self.0)
        }
        async fn ip4(&self) -> Result<IpAddr> {
            Ok(self.0)
        }
        async fn ip6(&self) -> Result<IpAddr> {
            Err(Error::public_ip("no IPv6"))
        }
    }

    #[test]
    fn ring_is_fair() {
        for k in 1..=5usize {
            for n in 0..=23usize {
                let ring = Ring::new((0..k).collect::<Vec<_>>()).unwrap();
                let mut counts = vec![0usize; k];
                for _ in 0..n {
                    counts[*ring.next()] += 1;
                }
                for count in counts {
                    assert!(count == n / k || count == n.div_ceil(k), "k={k} n={n}");
                }
            }
        }
    }

    #[test]
    fn empty_ring_is_rejected() {
        assert!(Ring::<u8>::new(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn cycling_fetcher_alternates() {
        let a = IpAddr::from([203, 0, 113, 1]);
        let b = IpAddr::from([203, 0, 113, 2]);
        let fetcher = CyclingFetcher::new(vec![Arc::new(Constant(a)), Arc::new(Constant(b))])
            .unwrap();

        assert_eq!(fetcher.ip4().await.unwrap(), a);
        assert_eq!(fetcher.ip().await.unwrap(), b);
        assert_eq!(fetcher.ip4().await.unwrap(), a);
        assert!(fetcher.ip6().await.is_err());
    }
}
