//! Shared constants used across the worker.

/// Default URL for the ratings dataset (tab-separated, gzip-compressed).
pub const RATINGS_DATASET_URL: &str = "https://datasets.imdbws.com/title.ratings.tsv.gz";

/// Default URL for the basics dataset (tab-separated, gzip-compressed).
pub const BASICS_DATASET_URL: &str = "https://datasets.imdbws.com/title.basics.tsv.gz";

/// Local filename for the cached ratings dataset.
pub const RATINGS_DATASET_FILE: &str = "title.ratings.tsv.gz";

/// Local filename for the cached basics dataset.
pub const BASICS_DATASET_FILE: &str = "title.basics.tsv.gz";

/// Missing-value sentinel used by the datasets.
pub const DATASET_SENTINEL: &str = "\\N";

/// List tag applied by the primary ranked-list sync job.
pub const TOP250_LIST: &str = "top250";

/// List tag applied by the secondary (anime) ranked-list sync job.
pub const ANIME_TOP50_LIST: &str = "anime-top50";

/// Default TMDB API base URL.
pub const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";

/// Fallback image base URL when the configuration endpoint is unreachable.
pub const TMDB_IMAGE_BASE_FALLBACK: &str = "https://image.tmdb.org/t/p/";

/// Rows written per bulk upsert chunk.
pub const UPSERT_CHUNK_SIZE: usize = 50;
