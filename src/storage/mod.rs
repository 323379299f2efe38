//! Storage for crawled posts.
//!
//! Each platform gets a pair of CSV files under the data directory:
//!
//! ```text
//! data/
//! ├── weibo_data.csv        # main table, append-only
//! ├── weibo_new.csv         # rows added by the latest run
//! ├── zhihu_data.csv
//! └── ...
//! ```
//!
//! The main table's `url` column doubles as the dedup index: a run
//! loads it into a set before crawling and only appends unseen URLs.

pub mod local;

pub use local::CsvStore;
