//! Tag I/O through extended attributes.
//!
//! Tags live in a single `user.` xattr as newline-separated UTF-8. On
//! platforms without xattr support both operations degrade to no-ops.

use std::path::Path;

use crate::error::Result;

/// Extended attribute holding a file's tags.
pub const TAGS_XATTR: &str = "user.satchel.tags";

fn encode(tags: &[String]) -> Vec<u8> {
    tags.join("\n").into_bytes()
}

fn decode(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a file's tags. A file without the attribute, or a filesystem
/// without xattr support, yields no tags.
#[cfg(unix)]
pub fn get_tags(path: &Path) -> Vec<String> {
    match xattr::get(path, TAGS_XATTR) {
        Ok(Some(raw)) => decode(&raw),
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::debug!("reading tags from {path:?} failed: {e}");
            Vec::new()
        }
    }
}

#[cfg(not(unix))]
pub fn get_tags(_path: &Path) -> Vec<String> {
    Vec::new()
}

/// Write a file's tags.
#[cfg(unix)]
pub fn set_tags(path: &Path, tags: &[String]) -> Result<()> {
    xattr::set(path, TAGS_XATTR, &encode(tags))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_tags(_path: &Path, _tags: &[String]) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let tags = vec!["tag1".to_string(), "tag two".to_string()];
        assert_eq!(decode(&encode(&tags)), tags);
    }

    #[test]
    fn decode_skips_empty_lines() {
        assert_eq!(decode(b"a\n\nb\n"), vec!["a".to_string(), "b".to_string()]);
        assert!(decode(b"").is_empty());
    }
}
