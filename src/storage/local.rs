//! Local CSV table storage.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::Result;
use crate::models::{Platform, Post};

/// UTF-8 byte order mark, written at file creation so spreadsheet
/// software detects the encoding.
const BOM: &str = "\u{feff}";

/// CSV-backed post store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct CsvStore {
    data_dir: PathBuf,
}

impl CsvStore {
    /// Create a store rooted at the given directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Path of the platform's main table.
    pub fn main_table(&self, platform: Platform) -> PathBuf {
        self.data_dir.join(format!("{platform}_data.csv"))
    }

    /// Path of the platform's per-run increment file.
    pub fn increment_table(&self, platform: Platform) -> PathBuf {
        self.data_dir.join(format!("{platform}_new.csv"))
    }

    /// Load the set of URLs already present in the main table.
    ///
    /// A missing table is an empty set, not an error.
    pub fn seen_urls(&self, platform: Platform) -> Result<HashSet<String>> {
        let path = self.main_table(platform);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e.into()),
        };
        let content = content.trim_start_matches(BOM);

        let mut reader = ReaderBuilder::new().from_reader(content.as_bytes());
        let url_column = reader
            .headers()?
            .iter()
            .position(|h| h == "url");

        let Some(url_column) = url_column else {
            log::warn!("No url column in {}; treating table as empty", path.display());
            return Ok(HashSet::new());
        };

        let mut urls = HashSet::new();
        for record in reader.records() {
            let record = record?;
            if let Some(url) = record.get(url_column) {
                if !url.is_empty() {
                    urls.insert(url.to_string());
                }
            }
        }
        Ok(urls)
    }

    /// Append rows to the main table, creating it (BOM + header) on
    /// first use. Returns the number of rows written.
    pub fn append(&self, platform: Platform, posts: &[Post]) -> Result<usize> {
        if posts.is_empty() {
            return Ok(0);
        }
        fs::create_dir_all(&self.data_dir)?;

        let path = self.main_table(platform);
        let is_new = !path.exists();

        let mut writer = if is_new {
            let mut file = File::create(&path)?;
            file.write_all(BOM.as_bytes())?;
            WriterBuilder::new().has_headers(true).from_writer(file)
        } else {
            let file = OpenOptions::new().append(true).open(&path)?;
            WriterBuilder::new().has_headers(false).from_writer(file)
        };

        for post in posts {
            writer.serialize(post)?;
        }
        writer.flush()?;
        Ok(posts.len())
    }

    /// Overwrite the increment file with this run's new rows.
    pub fn write_increment(&self, platform: Platform, posts: &[Post]) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let mut file = File::create(self.increment_table(platform))?;
        file.write_all(BOM.as_bytes())?;
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
        for post in posts {
            writer.serialize(post)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Row count of the main table, or `None` if it doesn't exist yet.
    pub fn row_count(&self, platform: Platform) -> Result<Option<usize>> {
        let path = self.main_table(platform);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content = content.trim_start_matches(BOM);

        let mut reader = ReaderBuilder::new().from_reader(content.as_bytes());
        let mut count = 0;
        for record in reader.records() {
            record?;
            count += 1;
        }
        Ok(Some(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_post(url: &str) -> Post {
        Post {
            author: "测试用户".to_string(),
            content: "正文, 含逗号".to_string(),
            url: url.to_string(),
            scraped_at: "2026-03-10 15:30:00".to_string(),
            ..Post::new("张楠", "zhihu")
        }
    }

    #[test]
    fn test_append_creates_table_with_bom_and_header() {
        let tmp = TempDir::new().unwrap();
        let store = CsvStore::new(tmp.path());

        let written = store
            .append(Platform::Zhihu, &[sample_post("https://example.com/1")])
            .unwrap();
        assert_eq!(written, 1);

        let bytes = fs::read(store.main_table(Platform::Zhihu)).unwrap();
        assert_eq!(&bytes[..3], BOM.as_bytes());

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("keyword,source,kind"));
    }

    #[test]
    fn test_append_twice_keeps_single_header() {
        let tmp = TempDir::new().unwrap();
        let store = CsvStore::new(tmp.path());

        store
            .append(Platform::Zhihu, &[sample_post("https://example.com/1")])
            .unwrap();
        store
            .append(Platform::Zhihu, &[sample_post("https://example.com/2")])
            .unwrap();

        let text = fs::read_to_string(store.main_table(Platform::Zhihu)).unwrap();
        let headers = text.matches("keyword,source").count();
        assert_eq!(headers, 1);
        assert_eq!(store.row_count(Platform::Zhihu).unwrap(), Some(2));
    }

    #[test]
    fn test_seen_urls_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = CsvStore::new(tmp.path());

        assert!(store.seen_urls(Platform::Weibo).unwrap().is_empty());

        store
            .append(
                Platform::Weibo,
                &[
                    sample_post("https://example.com/a"),
                    sample_post("https://example.com/b"),
                ],
            )
            .unwrap();

        let seen = store.seen_urls(Platform::Weibo).unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("https://example.com/a"));
    }

    #[test]
    fn test_write_increment_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = CsvStore::new(tmp.path());

        store
            .write_increment(Platform::Zhihu, &[sample_post("https://example.com/1")])
            .unwrap();
        store
            .write_increment(Platform::Zhihu, &[sample_post("https://example.com/2")])
            .unwrap();

        let text = fs::read_to_string(store.increment_table(Platform::Zhihu)).unwrap();
        assert!(!text.contains("example.com/1"));
        assert!(text.contains("example.com/2"));
    }

    #[test]
    fn test_row_count_missing_table() {
        let tmp = TempDir::new().unwrap();
        let store = CsvStore::new(tmp.path());
        assert_eq!(store.row_count(Platform::Weibo).unwrap(), None);
    }
}
