//! Mounts as seen from inside a process, and host mount devices
//!
//! Both are parsed from plain text embedded in the capture:
//! `/proc/<pid>/mountinfo` for per-process mounts and `/proc/mounts` for
//! where each device is mounted on the analysis host.

use crate::strings::StringPool;
use std::sync::Arc;

/// One entry of a process's mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub mount_id: i32,
    pub parent_mount_id: i32,
    pub device_major: u32,
    pub device_minor: u32,
    /// Directory of the source filesystem that is mounted
    pub root: Arc<str>,
    /// Where `root` appears inside the process
    pub mount_point: Arc<str>,
    pub mount_source: Arc<str>,
    pub filesystem_type: Arc<str>,
    /// Raw comma-separated superblock options
    pub superblock_options: Arc<str>,
    /// Synthesized from an overlay record rather than parsed from mountinfo
    pub is_overlay: bool,
    pub layer: u8,
}

impl Mount {
    /// Parse one `/proc/<pid>/mountinfo` line
    ///
    /// ```text
    /// 36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw,errors=continue
    /// ```
    ///
    /// Returns `None` for lines with fewer than ten fields. A line missing
    /// the `-` separator or any of the three fields after it keeps what was
    /// parsed, with the missing fields left empty.
    #[must_use]
    pub fn parse_mountinfo(strings: &StringPool, line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end_matches('\r').split(' ').collect();
        if fields.len() < 10 {
            return None;
        }

        let (device_major, device_minor) = fields[2]
            .split_once(':')
            .map(|(major, minor)| (major.parse().unwrap_or(0), minor.parse().unwrap_or(0)))
            .unwrap_or_default();

        // optional fields run until a lone "-"
        let tail = fields[6..]
            .iter()
            .position(|f| *f == "-")
            .map_or(&[][..], |i| &fields[6 + i + 1..]);
        let tail_field = |n: usize| tail.get(n).copied().unwrap_or("");

        Some(Self {
            mount_id: fields[0].parse().unwrap_or(0),
            parent_mount_id: fields[1].parse().unwrap_or(0),
            device_major,
            device_minor,
            root: strings.intern(&unescape(fields[3])),
            mount_point: strings.intern(&unescape(fields[4])),
            filesystem_type: strings.intern(tail_field(0)),
            mount_source: strings.intern(&unescape(tail_field(1))),
            superblock_options: strings.intern(tail_field(2)),
            is_overlay: false,
            layer: 0,
        })
    }

    /// Mount synthesized from an overlay record: `source` on the host
    /// appears at `destination` inside the process
    #[must_use]
    pub fn overlay(strings: &StringPool, layer: u8, source: &str, destination: &str) -> Self {
        Self {
            mount_id: -1,
            parent_mount_id: -1,
            device_major: 0,
            device_minor: 0,
            root: strings.intern("/"),
            mount_point: strings.intern(destination),
            mount_source: strings.intern(source),
            filesystem_type: strings.intern("none"),
            superblock_options: strings.intern(""),
            is_overlay: true,
            layer,
        }
    }

    /// Value of superblock option `name`
    ///
    /// Returns `Some("")` for a flag option without a value and `None` if
    /// the option is absent.
    #[must_use]
    pub fn superblock_option(&self, name: &str) -> Option<&str> {
        superblock_option(&self.superblock_options, name)
    }

    /// Portion of `path` strictly below this mount's mount point, without
    /// a leading slash, or `None` if `path` is outside the mount
    #[must_use]
    pub fn relative_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        let mount_point = self.mount_point.trim_end_matches('/');
        path.strip_prefix(mount_point)?.strip_prefix('/')
    }
}

/// Where a block device or btrfs subvolume is mounted on the analysis host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountDevice {
    pub fs_spec: Arc<str>,
    pub mount_point: Arc<str>,
    pub subvolume: Option<Arc<str>>,
}

impl MountDevice {
    /// Parse one `/proc/mounts` line
    ///
    /// ```text
    /// /dev/nvme0n1p3 /home btrfs rw,relatime,subvol=/home 0 0
    /// ```
    ///
    /// Returns `None` unless the line has all five fields.
    #[must_use]
    pub fn parse_mounts_line(strings: &StringPool, line: &str) -> Option<Self> {
        let fields: Vec<String> =
            line.trim_end_matches('\r').splitn(5, ' ').map(unescape).collect();
        if fields.len() != 5 {
            return None;
        }

        let subvolume = (fields[2] == "btrfs")
            .then(|| superblock_option(&fields[3], "subvol"))
            .flatten()
            .filter(|subvol| !subvol.is_empty())
            .map(|subvol| strings.intern(subvol));

        Some(Self {
            fs_spec: strings.intern(&fields[0]),
            mount_point: strings.intern(&fields[1]),
            subvolume,
        })
    }
}

/// Find `name` in a comma-separated option list
fn superblock_option<'a>(options: &'a str, name: &str) -> Option<&'a str> {
    options.split(',').find_map(|option| match option.split_once('=') {
        Some((key, value)) if key == name => Some(value),
        None if option == name => Some(""),
        _ => None,
    })
}

/// Decode the octal escapes the kernel uses in mount tables (`\040` etc.)
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value =
                bytes[i + 1..i + 4].iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            out.push(u8::try_from(value).unwrap_or(b'?'));
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|b| (b'0'..=b'7').contains(b))
}
