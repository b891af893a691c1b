//! Venue name to live feed lookup, owned by the composition root.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use super::venues;
use super::ExchangeFeed;
use crate::config::Config;
use crate::error::FeedError;

/// Registry of live feeds keyed by lowercase venue name.
///
/// Registration is last-write-wins. The registry only looks feeds up; stopping
/// them is the caller's job via [`FeedRegistry::stop_all`].
#[derive(Default)]
pub struct FeedRegistry {
    feeds: DashMap<String, Arc<dyn ExchangeFeed>>,
}

fn key(venue: &str) -> String {
    venue.trim().to_lowercase()
}

impl FeedRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feed, returning the one it replaced.
    pub fn register(
        &self,
        venue: &str,
        feed: Arc<dyn ExchangeFeed>,
    ) -> Option<Arc<dyn ExchangeFeed>> {
        let previous = self.feeds.insert(key(venue), feed);
        if previous.is_some() {
            warn!(venue, "Replacing registered feed");
        }
        previous
    }

    /// Remove a feed.
    pub fn unregister(&self, venue: &str) -> Option<Arc<dyn ExchangeFeed>> {
        self.feeds.remove(&key(venue)).map(|(_, feed)| feed)
    }

    /// Look up a feed.
    pub fn get(&self, venue: &str) -> Option<Arc<dyn ExchangeFeed>> {
        self.feeds.get(&key(venue)).map(|entry| entry.value().clone())
    }

    /// Registered venue names, sorted.
    pub fn venues(&self) -> Vec<String> {
        let mut venues: Vec<String> = self.feeds.iter().map(|e| e.key().clone()).collect();
        venues.sort();
        venues
    }

    /// Number of registered feeds.
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Start and register a streaming feed for every configured stream venue.
    ///
    /// Venue aliases register under the feed's canonical name. If any venue
    /// fails to start, the feeds this call already started are stopped and
    /// unregistered before the error is returned.
    pub async fn start_all(
        &self,
        config: &Config,
    ) -> Result<HashMap<String, Arc<dyn ExchangeFeed>>, FeedError> {
        let mut started = HashMap::new();

        for venue in &config.stream_venues {
            if key(venue).is_empty() {
                continue;
            }

            let feed = match venues::streaming_feed(venue, config) {
                Ok(feed) => feed,
                Err(e) => {
                    warn!(venue = %venue, error = %e, started = started.len(), "Feed start failed, rolling back");
                    self.stop_all(&started).await;
                    return Err(e);
                }
            };

            let name = key(feed.venue());
            if started.contains_key(&name) {
                feed.stop().await;
                continue;
            }
            self.register(&name, feed.clone());
            info!(venue = %name, symbols = ?config.stream_symbols, "Started streaming feed");
            started.insert(name, feed);
        }

        Ok(started)
    }

    /// Stop every feed and drop the registrations that still point at them.
    pub async fn stop_all(&self, feeds: &HashMap<String, Arc<dyn ExchangeFeed>>) {
        for (venue, feed) in feeds {
            feed.stop().await;
            self.feeds
                .remove_if(venue, |_, registered| Arc::ptr_eq(registered, feed));
        }
        info!(count = feeds.len(), "Stopped feeds");
    }
}
