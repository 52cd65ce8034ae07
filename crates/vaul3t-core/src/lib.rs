//! Foundational low-level utilities shared across vaul3t crates.
//!
//! Provides the atomic file-write helper, unix time helpers, and the
//! whole-file JSON tables that back every durable store.

pub mod atomic_io;
pub mod flat_table;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use flat_table::FlatTable;
pub use time_utils::{current_unix_timestamp, is_past_deadline, seconds_until};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn unit_deadline_helpers_are_strict_and_saturating() {
        assert!(!is_past_deadline(100, 99));
        assert!(!is_past_deadline(100, 100));
        assert!(is_past_deadline(100, 101));
        assert_eq!(seconds_until(100, 40), 60);
        assert_eq!(seconds_until(100, 140), 0);
    }

    #[test]
    fn unit_current_unix_timestamp_is_after_2020() {
        assert!(current_unix_timestamp() > 1_577_836_800);
    }

    #[test]
    fn write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sample.json");
        write_text_atomic(&path, "{}").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "{}");
    }

    #[test]
    fn regression_write_text_atomic_rejects_directory_destination() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "{}").expect_err("directory should fail");
        assert!(error.to_string().contains("is a directory"));
    }
}
