// Budev Enumerator
// Device-namespace walk with filter selection and an optional topology pass

use std::io;
use std::os::unix::fs::FileTypeExt;

use walkdir::WalkDir;

use crate::context::Udev;
use crate::filter::{FilterChain, FilterKind};
use crate::list::EntryList;

/// Errors aborting a device scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("device tree walk failed: {0}")]
    Tree(#[source] io::Error),
}

/// Walks the device namespace and collects the paths an installed filter
/// chain selects.
///
/// Filter semantics are those of the underlying chain: without at least
/// one positive match rule the result set is always empty, and a matching
/// negated rule excludes a path regardless of positive matches.
pub struct Enumerator {
    udev: Udev,
    filters: FilterChain,
    devices: EntryList,
}

impl Enumerator {
    pub fn new(udev: &Udev) -> Self {
        Self {
            udev: udev.clone(),
            filters: FilterChain::new(),
            devices: EntryList::new(),
        }
    }

    pub fn udev(&self) -> &Udev {
        &self.udev
    }

    /// Select devices whose subsystem matches a glob pattern.
    pub fn match_subsystem(&mut self, subsystem: &str) {
        self.filters.add(FilterKind::Subsystem, false, subsystem);
    }

    /// Exclude devices whose subsystem matches a glob pattern.
    pub fn nomatch_subsystem(&mut self, subsystem: &str) {
        self.filters.add(FilterKind::Subsystem, true, subsystem);
    }

    /// Select devices whose leaf name matches a glob pattern.
    pub fn match_sysname(&mut self, sysname: &str) {
        self.filters.add(FilterKind::Sysname, false, sysname);
    }

    /// Attribute matching is not supported on this host; accepted and
    /// ignored.
    pub fn match_sysattr(&mut self, sysattr: &str, _value: Option<&str>) {
        log::debug!("ignoring unsupported sysattr match on {sysattr}");
    }

    /// See [`Enumerator::match_sysattr`].
    pub fn nomatch_sysattr(&mut self, sysattr: &str, _value: Option<&str>) {
        log::debug!("ignoring unsupported sysattr nomatch on {sysattr}");
    }

    /// Property matching is not supported on this host; accepted and
    /// ignored.
    pub fn match_property(&mut self, property: &str, _value: Option<&str>) {
        log::debug!("ignoring unsupported property match on {property}");
    }

    /// Tag matching is not supported on this host; accepted and ignored.
    pub fn match_tag(&mut self, tag: &str) {
        log::debug!("ignoring unsupported tag match on {tag}");
    }

    /// All devices are initialized here, so this never narrows anything.
    pub fn match_is_initialized(&mut self) {}

    /// Walk the namespace and rebuild the result list.
    ///
    /// Previous results are discarded first. Symbolic links and character
    /// device nodes are tested against the filter chain; directories are
    /// recursed depth-first. When the context carries a device tree, a
    /// second pass feeds every attached node name through the same
    /// selection. A tree walk failure aborts the scan as a whole and
    /// leaves the result list empty.
    pub fn scan_devices(&mut self) -> Result<(), ScanError> {
        self.devices.clear();

        for entry in WalkDir::new(self.udev.dev_path())
            .min_depth(1)
            .follow_links(false)
        {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    // A missing root is an empty namespace, not an error.
                    log::debug!("scan skipping entry: {err}");
                    continue;
                }
            };
            let file_type = entry.file_type();
            if file_type.is_symlink() || file_type.is_char_device() {
                let syspath = entry.path().to_string_lossy().into_owned();
                self.consider(&syspath);
            }
        }

        if let Some(tree) = self.udev.device_tree() {
            let udev = self.udev.clone();
            let filters = self.filters.clone();
            let devices = &mut self.devices;
            let result = tree.visit_attached(&mut |name| {
                if !name.is_empty() && filters.matches(&udev, name) {
                    devices.insert(name, None);
                }
            });
            if let Err(err) = result {
                self.devices.clear();
                return Err(ScanError::Tree(err));
            }
        }

        Ok(())
    }

    fn consider(&mut self, syspath: &str) {
        if self.filters.matches(&self.udev, syspath) {
            self.devices.insert(syspath, None);
        }
    }

    /// Seed the result list with a path directly, bypassing the scan.
    pub fn add_syspath(&mut self, syspath: &str) {
        self.devices.insert(syspath, None);
    }

    /// Matched paths, in scan order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|e| e.name())
    }

    /// The raw result list.
    pub fn list(&self) -> &EntryList {
        &self.devices
    }
}
