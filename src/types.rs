//! Core types shared between the storage layer and the HTTP API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Extensions that count as images when listing a category directory.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Storage category of an image. Determines both the directory it lives in
/// and its default visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Public,
    Private,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Public, Category::Private];

    /// Directory name under the image root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Public => "public",
            Category::Private => "private",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Category::Public),
            "private" => Ok(Category::Private),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Lowercased extension of `filename`, without the dot.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether `filename` carries one of the listable image extensions.
pub fn has_image_extension(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Content type served for an image, derived from its extension.
///
/// Anything not in the table is served as `image/jpeg`.
pub fn content_type_for(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Check that `name` is a plain base name that cannot escape its directory.
///
/// Rejects empty names, `.` and `..`, anything containing a path separator
/// or NUL, and anything `Path::file_name` would not return unchanged.
pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains(['/', '\\', '\0']) {
        return false;
    }
    Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

/// Reduce a client-supplied upload name (which browsers sometimes send with
/// a directory prefix) to its final component.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_category_round_trip_names() {
        assert_eq!("public".parse::<Category>().unwrap(), Category::Public);
        assert_eq!("private".parse::<Category>().unwrap(), Category::Private);
        assert!("Private".parse::<Category>().is_err());
        assert!("../private".parse::<Category>().is_err());
    }

    #[test]
    fn test_content_type_table() {
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("logo.svg"), "image/svg+xml");
        assert_eq!(content_type_for("anim.gif"), "image/gif");
        assert_eq!(content_type_for("photo.webp"), "image/webp");
        assert_eq!(content_type_for("photo.jpg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "image/jpeg");
    }

    #[test]
    fn test_image_extension_filter() {
        assert!(has_image_extension("a.jpeg"));
        assert!(has_image_extension("A.WEBP"));
        assert!(!has_image_extension("a.svg"));
        assert!(!has_image_extension("notes.txt"));
        assert!(!has_image_extension("png"));
    }

    #[test]
    fn test_safe_filename_rejects_traversal() {
        assert!(is_safe_filename("secret.png"));
        assert!(is_safe_filename("..hidden.png"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename("."));
        assert!(!is_safe_filename(".."));
        assert!(!is_safe_filename("../secret.png"));
        assert!(!is_safe_filename("private/secret.png"));
        assert!(!is_safe_filename("/etc/passwd"));
        assert!(!is_safe_filename("..\\win.ini"));
        assert!(!is_safe_filename("a\0b.png"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("C:\\Users\\me\\cat.png"), "cat.png");
        assert_eq!(base_name("dir/sub/cat.png"), "cat.png");
        assert_eq!(base_name("cat.png"), "cat.png");
    }

    proptest! {
        #[test]
        fn safe_names_never_contain_separators(name in "\\PC{0,32}") {
            if is_safe_filename(&name) {
                prop_assert!(!name.contains('/'));
                prop_assert!(!name.contains('\\'));
                prop_assert!(name != "..");
                let joined = std::path::Path::new("/root").join(&name);
                prop_assert_eq!(
                    joined.parent(),
                    Some(std::path::Path::new("/root"))
                );
            }
        }

        #[test]
        fn plain_alphanumeric_names_are_safe(stem in "[a-zA-Z0-9_-]{1,24}", ext in "(png|jpg|gif|webp)") {
            let name = format!("{}.{}", stem, ext);
            prop_assert!(is_safe_filename(&name));
            prop_assert!(has_image_extension(&name));
        }
    }
}
