use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

const REMOTE_FS_TYPES: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smbfs",
    "smb3",
    "ncpfs",
    "afs",
    "coda",
    "9p",
    "ceph",
    "glusterfs",
    "fuse.glusterfs",
    "fuse.sshfs",
    "sshfs",
    "davfs",
    "fuse.rclone",
];

/// Whether `path` lives on a network filesystem, whose changes the kernel cannot report.
pub fn is_remote(path: &Path) -> bool {
    match fs::read_to_string("/proc/self/mounts") {
        Ok(mounts) => mount_fs_type(&mounts, path).map_or(false, |fs_type| {
            let remote = REMOTE_FS_TYPES.contains(&fs_type);
            if remote {
                debug!("{:?} is on a {} mount", path, fs_type);
            }
            remote
        }),
        Err(e) => {
            debug!("Unable to read mount table: {}", e);
            false
        }
    }
}

/// Filesystem type of the mount point with the longest prefix of `path`.
fn mount_fs_type<'a>(mounts: &'a str, path: &Path) -> Option<&'a str> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = unescape(fields.next()?);
            let fs_type = fields.next()?;
            path.starts_with(&mount_point)
                .then(|| (mount_point.components().count(), fs_type))
        })
        .max_by_key(|(depth, _)| *depth)
        .map(|(_, fs_type)| fs_type)
}

// The mount table escapes blanks and backslashes as three-digit octal.
fn unescape(field: &str) -> PathBuf {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(idx) = rest.find('\\') {
        out.push_str(&rest[..idx]);
        let code = rest.get(idx + 1..idx + 4);
        match code.and_then(|code| u8::from_str_radix(code, 8).ok()) {
            Some(byte) => {
                out.push(char::from(byte));
                rest = &rest[idx + 4..];
            }
            None => {
                out.push('\\');
                rest = &rest[idx + 1..];
            }
        }
    }
    out.push_str(rest);
    PathBuf::from(out)
}
