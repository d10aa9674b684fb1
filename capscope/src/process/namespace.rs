//! Per-process mount namespace and path translation
//!
//! A path recorded inside a container or sandbox usually does not exist at
//! the same location on the analysis host. Translation walks the process's
//! mounts, most specific first, and rewrites the path into every host
//! location that could hold the file.

use super::mount::{Mount, MountDevice};
use std::borrow::Cow;
use std::cmp::Reverse;

#[derive(Debug, Clone, Default)]
pub struct MountNamespace {
    devices: Vec<MountDevice>,
    mounts: Vec<Mount>,
    dirty: bool,
}

impl MountNamespace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// New namespace sharing this one's host devices but none of its mounts
    #[must_use]
    pub fn copy(&self) -> Self {
        Self { devices: self.devices.clone(), mounts: Vec::new(), dirty: false }
    }

    pub fn add_device(&mut self, device: MountDevice) {
        self.devices.push(device);
    }

    pub fn add_mount(&mut self, mount: Mount) {
        self.mounts.push(mount);
        self.dirty = true;
    }

    #[must_use]
    pub fn devices(&self) -> &[MountDevice] {
        &self.devices
    }

    /// Mounts in insertion order
    #[must_use]
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Put mounts in translation order
    pub fn sort(&mut self) {
        if self.dirty {
            self.mounts.sort_by_key(translation_order);
            self.dirty = false;
        }
    }

    /// Mounts in translation order: overlays first, then deeper mount
    /// points, then lower overlay layers
    #[must_use]
    pub fn ordered_mounts(&self) -> Cow<'_, [Mount]> {
        if self.dirty {
            let mut mounts = self.mounts.clone();
            mounts.sort_by_key(translation_order);
            Cow::Owned(mounts)
        } else {
            Cow::Borrowed(&self.mounts)
        }
    }

    /// Host paths that may hold `path`, best candidate first
    ///
    /// Never empty: with no matching mount the path is returned unchanged.
    #[must_use]
    pub fn translate(&self, path: &str) -> Vec<String> {
        let mut candidates = Vec::new();

        for mount in self.ordered_mounts().iter() {
            let Some(relative) = mount.relative_path(path) else {
                continue;
            };

            if mount.is_overlay {
                candidates.push(build_path(&[&mount.mount_source, relative]));
            } else if &*mount.filesystem_type == "overlay" {
                let dirs = ["upperdir", "lowerdir"]
                    .into_iter()
                    .filter_map(|option| mount.superblock_option(option))
                    .flat_map(|dirs| dirs.split(':'))
                    .filter(|dir| !dir.is_empty());
                candidates.extend(dirs.map(|dir| build_path(&[dir, relative])));
            } else if let Some(device) = self.find_device(mount) {
                let root = match &device.subvolume {
                    Some(subvolume) => strip_subvolume(&mount.root, subvolume),
                    None => &mount.root,
                };
                candidates.push(build_path(&[&device.mount_point, root, relative]));
            }
        }

        if candidates.is_empty() {
            candidates.push(path.to_string());
        }
        candidates
    }

    fn find_device(&self, mount: &Mount) -> Option<&MountDevice> {
        let subvolume = mount.superblock_option("subvol");

        self.devices.iter().find(|device| {
            if device.fs_spec != mount.mount_source {
                return false;
            }
            match subvolume {
                // both / and /sysroot come from the same subvolume on ostree systems
                Some(subvolume) => {
                    device.subvolume.as_deref() == Some(subvolume)
                        && &*device.mount_point != "/sysroot"
                }
                None => true,
            }
        })
    }
}

fn translation_order(mount: &Mount) -> (Reverse<bool>, Reverse<usize>, u8) {
    (Reverse(mount.is_overlay), Reverse(mount.mount_point.len()), mount.layer)
}

fn strip_subvolume<'a>(root: &'a str, subvolume: &str) -> &'a str {
    if root == subvolume {
        return "/";
    }
    match root.strip_prefix(subvolume) {
        Some(rest) if rest.starts_with('/') => rest,
        _ => root,
    }
}

/// Join path segments with exactly one `/` between components
fn build_path(segments: &[&str]) -> String {
    let mut path = String::new();
    for component in segments.iter().flat_map(|s| s.split('/')).filter(|c| !c.is_empty()) {
        path.push('/');
        path.push_str(component);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}
