/// Configuration for the pipeline core
///
/// Loads configuration from environment variables.
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Kafka configuration
    pub kafka: KafkaConfig,
    /// Feed aggregation policy
    pub feed: FeedConfig,
    /// Media/upload policy
    pub media: MediaConfig,
    /// Token verification
    pub auth: AuthConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    pub max_connections: u32,
    /// Min connections in pool
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
}

/// Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap brokers
    pub brokers: String,
    /// Topic prefix; channel names are appended (e.g. "lume.social-events")
    pub topic_prefix: String,
    /// Consumer group id
    pub group_id: String,
}

/// Feed aggregation policy. The defaults are deliberate product decisions
/// (TTL-only expiry, fixed fan-out chunking); change with care.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Posts returned by the global feed
    pub global_limit: usize,
    /// Posts fetched per authored-by chunk on the following feed
    pub chunk_limit: usize,
    /// Upper bound on the merged following feed
    pub merged_limit: usize,
    /// Authors per membership-filtered query
    pub chunk_size: usize,
    /// Global feed cache TTL
    pub global_ttl: Duration,
    /// Following feed cache TTL (also used for the cacheable empty result)
    pub following_ttl: Duration,
    /// Deadline for a single store round-trip
    pub store_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            global_limit: 50,
            chunk_limit: 50,
            merged_limit: 100,
            chunk_size: 10,
            global_ttl: Duration::from_secs(300),
            following_ttl: Duration::from_secs(120),
            store_timeout: Duration::from_secs(10),
        }
    }
}

/// Media/upload policy
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Storage bucket that receives direct uploads
    pub bucket: String,
    /// Validity window of a signed upload URL
    pub upload_url_ttl: Duration,
    /// Object suffixes the lifecycle recognizes as media
    pub media_suffixes: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            bucket: "lume-media".to_string(),
            upload_url_ttl: Duration::from_secs(15 * 60),
            media_suffixes: ["mp4", "mov", "jpg", "jpeg", "png"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Token verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for bearer token verification
    pub jwt_secret: String,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn required(key: &str) -> CoreResult<String> {
    std::env::var(key)
        .map_err(|_| CoreError::Internal(format!("{} environment variable not set", key)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> CoreResult<Self> {
        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_max_connections),
            min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_min_connections),
        };

        let redis = RedisConfig {
            url: required("REDIS_URL")?,
        };

        let kafka = KafkaConfig {
            brokers: required("KAFKA_BROKERS")?,
            topic_prefix: std::env::var("KAFKA_TOPIC_PREFIX")
                .unwrap_or_else(|_| "lume".to_string()),
            group_id: std::env::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| "social-core".to_string()),
        };

        let defaults = FeedConfig::default();
        let feed = FeedConfig {
            chunk_size: env_usize("FEED_CHUNK_SIZE", defaults.chunk_size),
            global_ttl: env_duration_secs("FEED_GLOBAL_TTL_SECS", defaults.global_ttl),
            following_ttl: env_duration_secs("FEED_FOLLOWING_TTL_SECS", defaults.following_ttl),
            store_timeout: env_duration_secs("FEED_STORE_TIMEOUT_SECS", defaults.store_timeout),
            ..defaults
        };

        let media_defaults = MediaConfig::default();
        let media = MediaConfig {
            bucket: std::env::var("MEDIA_BUCKET").unwrap_or(media_defaults.bucket),
            upload_url_ttl: env_duration_secs("UPLOAD_URL_TTL_SECS", media_defaults.upload_url_ttl),
            media_suffixes: media_defaults.media_suffixes,
        };

        let auth = AuthConfig {
            jwt_secret: required("JWT_SECRET")?,
        };

        Ok(Config {
            database,
            redis,
            kafka,
            feed,
            media,
            auth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_defaults_match_policy() {
        let feed = FeedConfig::default();
        assert_eq!(feed.global_limit, 50);
        assert_eq!(feed.chunk_limit, 50);
        assert_eq!(feed.merged_limit, 100);
        assert_eq!(feed.chunk_size, 10);
        assert_eq!(feed.global_ttl, Duration::from_secs(300));
        assert_eq!(feed.following_ttl, Duration::from_secs(120));
    }

    #[test]
    fn media_defaults_recognize_common_suffixes() {
        let media = MediaConfig::default();
        assert!(media.media_suffixes.iter().any(|s| s == "mp4"));
        assert!(media.media_suffixes.iter().any(|s| s == "jpg"));
        assert_eq!(media.upload_url_ttl, Duration::from_secs(900));
    }
}
