//! File name helpers
//!
//! 扩展名一律按小写比较；文件名拆分保留原始大小写，由调用方决定是否规范化。

use std::path::Path;

/// Lowercased extension without the dot, `""` when there is none.
///
/// ```
/// use std::path::Path;
/// use tool_utils::common_utils::get_extension_lowercase;
///
/// assert_eq!(get_extension_lowercase(Path::new("scan.TIFF")), "tiff");
/// assert_eq!(get_extension_lowercase(Path::new("Makefile")), "");
/// ```
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// `extensions` are lowercase and dot-less.
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = get_extension_lowercase(path);
    !ext.is_empty() && extensions.iter().any(|e| *e == ext)
}

/// Dot-files, including the `.img-info-*.part` temp files written during conversion.
pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

/// 把文件名拆成 (主干, 扩展名)，扩展名保留点号和原始大小写
///
/// 开头的点不算扩展名分隔符，所以 `.profile` 没有扩展名。
///
/// # Examples
/// ```
/// use tool_utils::common_utils::split_file_name;
///
/// assert_eq!(split_file_name("photo.JPG"), ("photo", ".JPG"));
/// assert_eq!(split_file_name("a.b.png"), ("a.b", ".png"));
/// assert_eq!(split_file_name("README"), ("README", ""));
/// assert_eq!(split_file_name(".profile"), (".profile", ""));
/// ```
pub fn split_file_name(name: &str) -> (&str, &str) {
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name[leading_dots..].rfind('.') {
        Some(idx) => name.split_at(leading_dots + idx),
        None => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hidden_and_extension_checks() {
        assert!(is_hidden_file(Path::new("/pics/.img-info-x1.part")));
        assert!(!is_hidden_file(Path::new("/pics/photo.jpg")));
        assert!(has_extension(Path::new("photo.JPEG"), &["jpg", "jpeg"]));
        assert!(!has_extension(Path::new("photo"), &["jpg", ""]));
        assert!(!has_extension(Path::new("clip.webp"), &["jpg"]));
    }

    #[test]
    fn test_split_file_name_edges() {
        assert_eq!(split_file_name("..hidden.jpg"), ("..hidden", ".jpg"));
        assert_eq!(split_file_name("trailing."), ("trailing", "."));
        assert_eq!(split_file_name(""), ("", ""));
        assert_eq!(split_file_name("照片.Tif"), ("照片", ".Tif"));
    }

    proptest! {
        #[test]
        fn prop_split_file_name_rejoins(name in "[a-zA-Z0-9._]{0,16}") {
            let (base, ext) = split_file_name(&name);
            prop_assert_eq!(format!("{}{}", base, ext), name.clone());
            prop_assert!(ext.is_empty() || ext.starts_with('.'));
            prop_assert!(!ext[ext.len().min(1)..].contains('.'));
        }
    }
}
