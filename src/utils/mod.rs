use anyhow::{Context, Result};
use std::path::Path;

/// Create a directory (and parents) if it does not exist yet
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Current UTC time in SQLite's `datetime('now')` format, so stored values compare as text
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Mask an email for log output: keep the first two characters of the local part.
///
/// `juan.delacruz@example.com` becomes `ju***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{}***@{}", visible, domain)
        }
        None => "***".to_string(),
    }
}

/// Reduce an uploaded file name to a safe slug (`[a-z0-9-]`, at most 60 chars)
pub fn slugify_file_stem(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let mut slug = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug: String = slug.trim_matches('-').chars().take(60).collect();
    if slug.is_empty() {
        "backup".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("juan.delacruz@example.com"), "ju***@example.com");
        assert_eq!(mask_email("a@x.ph"), "a***@x.ph");
        assert_eq!(mask_email("not-an-email"), "***");
    }

    #[test]
    fn test_slugify_file_stem() {
        assert_eq!(slugify_file_stem("GeoAgri Backup (2024).sql"), "geoagri-backup-2024");
        assert_eq!(slugify_file_stem("../../etc/passwd.sql"), "passwd");
        assert_eq!(slugify_file_stem("___.sql"), "backup");
    }

    #[test]
    fn test_now_timestamp_format() {
        let ts = now_timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
