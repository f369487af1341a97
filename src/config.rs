use std::num::NonZeroUsize;

/// Compressed bytes decompressed per `ByteStreamer::read` call (10 MiB)
pub const BYTE_STREAMER_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Links grouped into one chunk of resolve + commit work
pub const LINK_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::new(10_000).unwrap();

/// Upper bound on vertices created in a single graph-store transaction
pub const ARTICLE_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(1_000).unwrap();

/// Every MediaWiki export namespace starts with this, e.g. `.../export-0.10/`
pub const EXPORT_NAMESPACE_PREFIX: &str = "http://www.mediawiki.org/xml/export-";

/// Title prefixes of pages that are not articles
pub const ARTICLE_NAME_PREFIX_BLACKLIST: &[&str] = &[
    "Wikipedia:",
    "WP:",
    ":",
    "File:",
    "Image:",
    "Template:",
    "User:",
];

/// Body prefix marking a redirect page
pub const REDIRECT_SIGIL: &str = "#REDIRECT [[";

pub const ARTICLE_VERTEX_TYPE: &str = "article";
pub const LINK_RELATION: &str = "link";
pub const LINK_WEIGHT: f64 = 1.0;

/// Edges fetched by `show` when no limit is given
pub const SHOW_EDGE_LIMIT: usize = 1000;

pub const DEFAULT_DATABASE_PATH: &str = "strand.sqlite";
pub const DEFAULT_BOLT_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_USER: &str = "neo4j";

/// Seconds before a graph-store request is abandoned
pub const REQUEST_TIMEOUT_SECS: u64 = 600;

pub const CONNECT_MAX_RETRIES: u32 = 30;
pub const CONNECT_RETRY_DELAY_SECS: u64 = 1;

pub const CHECKPOINT_VERSION: u32 = 1;

/// Committed chunks between checkpoint saves
pub const CHECKPOINT_INTERVAL: u32 = 1;
