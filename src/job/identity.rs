// ABOUTME: Derives the scheduler task name for a (source, destination) pair
// ABOUTME: Strips characters Task Scheduler rejects in object names

use std::fmt;
use std::path::Path;

/// Characters that may not appear in a task name.
pub const ILLEGAL_NAME_CHARS: [char; 9] = [':', '<', '>', '\\', '/', '?', '*', '|', '"'];

const PLACEHOLDER: char = '_';

/// Replaces every character in [`ILLEGAL_NAME_CHARS`] with `_`.
pub fn sanitize(path: &str) -> String {
    path.chars()
        .map(|c| {
            if ILLEGAL_NAME_CHARS.contains(&c) {
                PLACEHOLDER
            } else {
                c
            }
        })
        .collect()
}

/// Task name of a backup job.
///
/// Source and destination are sanitized separately and joined by a space,
/// so registering the same pair twice targets the same task. The mapping
/// is not injective: paths containing spaces can make two different pairs
/// share a name, and the later registration then replaces the earlier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobIdentity(String);

impl JobIdentity {
    pub fn from_paths(source: &Path, destination: &Path) -> Self {
        Self(format!(
            "{} {}",
            sanitize(&source.to_string_lossy()),
            sanitize(&destination.to_string_lossy())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_illegal(s: &str) -> bool {
        s.chars().any(|c| ILLEGAL_NAME_CHARS.contains(&c))
    }

    #[test]
    fn test_identity_from_windows_paths() {
        let cases = [
            (
                r"F:\GIMP\GIMP 2\share\mypaint-data\1.0\brushes\kaerhon_v1",
                r"E:\BackUp\Everything\試験\Test Spaces in path",
                "F__GIMP_GIMP 2_share_mypaint-data_1.0_brushes_kaerhon_v1 E__BackUp_Everything_試験_Test Spaces in path",
            ),
            (
                r"C:\Users\UserName\AppData\Roaming\BKKKKKKKKKK\thumbnail",
                r"E:\BackupFolderForThisTest\.ssh",
                "C__Users_UserName_AppData_Roaming_BKKKKKKKKKK_thumbnail E__BackupFolderForThisTest_.ssh",
            ),
        ];
        for (src, dest, want) in cases {
            let id = JobIdentity::from_paths(Path::new(src), Path::new(dest));
            assert_eq!(id.as_str(), want);
            assert!(!has_illegal(id.as_str()));
        }
    }

    #[test]
    fn test_sanitize_replaces_every_illegal_char() {
        let input = r#"a:b<c>d\e/f?g*h|i"j"#;
        let out = sanitize(input);
        assert_eq!(out, "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(out.chars().count(), input.chars().count());
    }

    #[test]
    fn test_sanitize_leaves_clean_input_alone() {
        for clean in ["", "plain", "spaces and.dots", "試験 フォルダ", "ümlaut-ß"] {
            assert_eq!(sanitize(clean), clean);
        }
    }

    #[test]
    fn test_space_join_can_collide() {
        let a = JobIdentity::from_paths(Path::new(r"C:\My Docs"), Path::new(r"D:\B"));
        let b = JobIdentity::from_paths(Path::new(r"C:\My"), Path::new(r"Docs D:\B"));
        assert_eq!(a.as_str(), "C__My Docs D__B");
        assert_eq!(a, b);
    }

    #[test]
    fn test_sides_sanitized_independently() {
        // A separator inside either path must not shift the joining space.
        let a = JobIdentity::from_paths(Path::new("C:|x"), Path::new("y"));
        let b = JobIdentity::from_paths(Path::new("C:"), Path::new("x y"));
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "C__x y");
    }
}
