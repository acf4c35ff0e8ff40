use std::ffi::OsStr;
use std::path::Path;

/// Split a changed entry into its containing directory and basename.
pub fn split_path(path: &Path) -> Option<(&Path, &OsStr)> {
    Some((path.parent()?, path.file_name()?))
}
