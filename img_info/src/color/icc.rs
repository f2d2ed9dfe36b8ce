//! ICC strategy: sRGB → CMYK press profile through Little CMS
//!
//! The profile comes from `IMG_INFO_CMYK_PROFILE` / `--cmyk-profile` when set,
//! otherwise from the first well-known CMYK profile found in the platform's
//! colour directories. Built without the `icc` feature, the strategy always
//! reports itself unavailable.

use image::RgbImage;
use std::path::{Path, PathBuf};

use super::{CmykImage, ColorConverter};
use crate::error::StrategyError;

/// Looked up in order in every search directory.
pub const PROFILE_NAMES: &[&str] = &[
    "USWebCoatedSWOP.icc",
    "CoatedFOGRA39.icc",
    "ISOcoated_v2_eci.icc",
    "ISOcoated_v2_300_eci.icc",
    "CoatedGRACoL2006.icc",
    "JapanColor2001Coated.icc",
];

/// Platform colour directories, most specific first.
pub fn profile_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let home = std::env::var_os("HOME").map(PathBuf::from);

    if cfg!(target_os = "macos") {
        if let Some(home) = &home {
            dirs.push(home.join("Library/ColorSync/Profiles"));
        }
        dirs.push(PathBuf::from("/Library/ColorSync/Profiles"));
        dirs.push(PathBuf::from("/System/Library/ColorSync/Profiles"));
    } else if cfg!(windows) {
        let root = std::env::var_os("SystemRoot")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Windows"));
        dirs.push(root.join(r"System32\spool\drivers\color"));
    } else {
        if let Some(home) = &home {
            dirs.push(home.join(".local/share/icc"));
            dirs.push(home.join(".color/icc"));
        }
        dirs.push(PathBuf::from("/usr/local/share/color/icc"));
        dirs.push(PathBuf::from("/usr/share/color/icc"));
    }
    dirs
}

/// First `PROFILE_NAMES` hit in `dirs` or their immediate subdirectories.
pub(crate) fn find_profile(dirs: &[PathBuf]) -> Option<PathBuf> {
    for name in PROFILE_NAMES {
        for dir in dirs {
            let direct = dir.join(name);
            if direct.is_file() {
                return Some(direct);
            }
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut subdirs: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            subdirs.sort();
            if let Some(hit) = subdirs.iter().map(|d| d.join(name)).find(|p| p.is_file()) {
                return Some(hit);
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct IccStrategy {
    profile: Option<PathBuf>,
    searched: Vec<PathBuf>,
}

impl IccStrategy {
    pub const NAME: &'static str = "icc";

    /// Uses `explicit` when given, otherwise searches the platform directories.
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        match explicit {
            Some(path) => Self::with_profile(path),
            None => {
                let searched = profile_search_dirs();
                Self {
                    profile: find_profile(&searched),
                    searched,
                }
            }
        }
    }

    pub fn with_profile(path: PathBuf) -> Self {
        Self {
            searched: vec![path.clone()],
            profile: Some(path),
        }
    }

    pub fn profile(&self) -> Option<&Path> {
        self.profile.as_deref()
    }

    fn missing_profile(&self) -> StrategyError {
        let searched: Vec<String> = self.searched.iter().map(|p| p.display().to_string()).collect();
        StrategyError::MissingProfile(searched.join(", "))
    }
}

impl ColorConverter for IccStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[cfg(feature = "icc")]
    fn to_cmyk(&self, rgb: &RgbImage) -> Result<CmykImage, StrategyError> {
        use lcms2::{ColorSpaceSignature, Intent, PixelFormat, Profile, Transform};

        let path = self.profile.as_deref().ok_or_else(|| self.missing_profile())?;
        if !path.is_file() {
            return Err(self.missing_profile());
        }

        let cmyk_profile = Profile::new_file(path)
            .map_err(|e| StrategyError::Transform(format!("{}: {}", path.display(), e)))?;
        if cmyk_profile.color_space() != ColorSpaceSignature::CmykData {
            return Err(StrategyError::Transform(format!(
                "{} is not a CMYK profile",
                path.display()
            )));
        }
        let srgb = Profile::new_srgb();
        let transform = Transform::<[u8; 3], [u8; 4]>::new(
            &srgb,
            PixelFormat::RGB_8,
            &cmyk_profile,
            PixelFormat::CMYK_8,
            Intent::Perceptual,
        )
        .map_err(|e| StrategyError::Transform(e.to_string()))?;

        let src: Vec<[u8; 3]> = rgb.pixels().map(|p| p.0).collect();
        let mut dst = vec![[0u8; 4]; src.len()];
        transform.transform_pixels(&src, &mut dst);

        let (width, height) = rgb.dimensions();
        let data: Vec<u8> = dst.into_iter().flatten().collect();
        CmykImage::new(width, height, data)
            .ok_or_else(|| StrategyError::BadOutput("transform changed pixel count".into()))
    }

    #[cfg(not(feature = "icc"))]
    fn to_cmyk(&self, _rgb: &RgbImage) -> Result<CmykImage, StrategyError> {
        if self.profile.is_none() {
            return Err(self.missing_profile());
        }
        Err(StrategyError::Unavailable(
            "built without ICC support (enable the `icc` feature)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_profile_direct_and_nested() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        assert!(find_profile(&[a.path().to_path_buf()]).is_none());

        std::fs::create_dir(b.path().join("vendor")).unwrap();
        let nested = b.path().join("vendor").join("CoatedFOGRA39.icc");
        std::fs::write(&nested, b"x").unwrap();
        let dirs = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        assert_eq!(find_profile(&dirs), Some(nested));

        // earlier names win over later ones regardless of directory order
        let swop = a.path().join("USWebCoatedSWOP.icc");
        std::fs::write(&swop, b"x").unwrap();
        assert_eq!(find_profile(&dirs), Some(swop));
    }

    #[test]
    fn test_missing_profile_error_lists_search_path() {
        let strategy = IccStrategy {
            profile: None,
            searched: vec![PathBuf::from("/nowhere/icc")],
        };
        match strategy.to_cmyk(&RgbImage::new(1, 1)).unwrap_err() {
            StrategyError::MissingProfile(list) => assert!(list.contains("/nowhere/icc")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_explicit_profile_that_does_not_exist() {
        let strategy = IccStrategy::discover(Some(PathBuf::from("/nowhere/custom.icc")));
        assert_eq!(strategy.profile(), Some(Path::new("/nowhere/custom.icc")));
        assert!(strategy.to_cmyk(&RgbImage::new(1, 1)).is_err());
    }

    #[cfg(feature = "icc")]
    #[test]
    fn test_garbage_profile_is_transform_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.icc");
        std::fs::write(&path, b"not an icc profile").unwrap();
        let err = IccStrategy::with_profile(path).to_cmyk(&RgbImage::new(1, 1)).unwrap_err();
        assert!(matches!(err, StrategyError::Transform(_)));
    }

    #[cfg(feature = "icc")]
    #[test]
    fn test_rgb_profile_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("srgb.icc");
        let icc = lcms2::Profile::new_srgb().icc().unwrap();
        std::fs::write(&path, icc).unwrap();
        let err = IccStrategy::with_profile(path).to_cmyk(&RgbImage::new(1, 1)).unwrap_err();
        match err {
            StrategyError::Transform(msg) => assert!(msg.contains("not a CMYK profile")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_search_dirs_not_empty() {
        assert!(!profile_search_dirs().is_empty());
    }
}
