use super::FileError;

const MAX_SEGMENT_LEN: usize = 255;
const INVALID_CHARS: &[char] = &['\0', '\n', '\r'];

/// Extensions rejected on upload, compared case-insensitively.
pub const DISALLOWED_EXTENSIONS: &[&str] = &["exe", "sh", "bat", "msi", "dll"];

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Normalizes a client-supplied folder into `a/b/c` form, `""` being the
/// owner's root.
pub fn normalize_folder(raw: &str) -> Result<String, FileError> {
    let mut segments = Vec::new();
    for segment in raw.split(['/', '\\']) {
        let segment = segment.trim();
        match segment {
            "" | "." => continue,
            ".." => return Err(FileError::InvalidPath("folder may not contain '..'".into())),
            _ => {
                validate_segment(segment)?;
                segments.push(segment);
            }
        }
    }
    Ok(segments.join("/"))
}

/// Reduces a client-supplied name to its final path component.
pub fn sanitize_filename(raw: &str) -> Result<String, FileError> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(FileError::InvalidPath(format!("invalid file name: {raw:?}")));
    }
    validate_segment(name)?;
    Ok(name.to_string())
}

pub fn join_relative(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Location of an owner-relative path inside the storage root.
pub fn owner_path(owner_id: i32, relative: &str) -> String {
    if relative.is_empty() {
        owner_id.to_string()
    } else {
        format!("{owner_id}/{relative}")
    }
}

/// Inverse of [`owner_path`]: the owner-relative part of a storage path.
pub fn strip_owner(owner_id: i32, storage_path: &str) -> Option<&str> {
    storage_path
        .strip_prefix(&owner_id.to_string())?
        .strip_prefix('/')
        .filter(|rest| !rest.is_empty())
}

pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_disallowed(name: &str) -> bool {
    extension_of(name)
        .map(|ext| DISALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_image(name: &str) -> bool {
    extension_of(name)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn validate_segment(segment: &str) -> Result<(), FileError> {
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(FileError::InvalidPath(
            "path segment cannot exceed 255 bytes".into(),
        ));
    }
    if segment.chars().any(|c| INVALID_CHARS.contains(&c)) {
        return Err(FileError::InvalidPath(
            "path segment contains invalid characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_folder_separators() {
        assert_eq!(normalize_folder("").unwrap(), "");
        assert_eq!(normalize_folder("/").unwrap(), "");
        assert_eq!(normalize_folder("photos").unwrap(), "photos");
        assert_eq!(normalize_folder("/photos//2024/").unwrap(), "photos/2024");
        assert_eq!(normalize_folder("photos\\2024\\.").unwrap(), "photos/2024");
    }

    #[test]
    fn rejects_parent_segments() {
        assert!(matches!(
            normalize_folder("../other"),
            Err(FileError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize_folder("photos/../../2"),
            Err(FileError::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_control_characters_and_long_segments() {
        assert!(normalize_folder("bad\0name").is_err());
        assert!(normalize_folder(&"a".repeat(256)).is_err());
        assert!(normalize_folder(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn sanitizes_traversal_to_bare_name() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini").unwrap(), "boot.ini");
        assert_eq!(sanitize_filename("report.pdf").unwrap(), "report.pdf");
    }

    #[test]
    fn rejects_empty_or_dot_names() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("dir/").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("a/.").is_err());
    }

    #[test]
    fn joins_relative_paths() {
        assert_eq!(join_relative("", "x.txt"), "x.txt");
        assert_eq!(join_relative("a/b", "x.txt"), "a/b/x.txt");
        assert_eq!(owner_path(7, "a/x.txt"), "7/a/x.txt");
        assert_eq!(owner_path(7, ""), "7");
        assert_eq!(strip_owner(7, "7/a/x.txt"), Some("a/x.txt"));
        assert_eq!(strip_owner(7, "71/x.txt"), None);
        assert_eq!(strip_owner(7, "7"), None);
    }

    #[test]
    fn classifies_extensions() {
        assert!(is_disallowed("setup.EXE"));
        assert!(is_disallowed("run.sh"));
        assert!(!is_disallowed("notes.txt"));
        assert!(!is_disallowed(".bashrc"));
        assert!(is_image("holiday.JPG"));
        assert!(!is_image("holiday.jpg.txt"));
    }
}
