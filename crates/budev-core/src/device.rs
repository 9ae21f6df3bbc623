// Budev Device Entity
// A device handle: path, action, property lists and a synthesized parent

use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use walkdir::WalkDir;

use crate::classify;
use crate::context::Udev;
use crate::list::EntryList;
use crate::util::{basename, sysnum};

/// Hotplug action a device was delivered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Not delivered through a monitor (enumerated or looked up).
    #[default]
    None,
    Add,
    Remove,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::None => "none",
            Action::Add => "add",
            Action::Remove => "remove",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device, or the synthesized parent of one.
///
/// The path is fixed at construction. Classification runs at construction
/// time for everything except removals and parents, filling the property
/// lists and possibly attaching a parent describing the device's upstream
/// bus/vendor/product identity.
///
/// A parent is owned exclusively by the device it describes; it has no
/// lifetime of its own and is dropped with its owner, however deep the
/// chain. Share a non-parent `Device` across threads by wrapping it in an
/// `Arc`; the lists are not internally synchronized.
#[derive(Debug)]
pub struct Device {
    udev: Udev,
    syspath: String,
    action: Action,
    properties: EntryList,
    sysattrs: EntryList,
    tags: EntryList,
    devlinks: EntryList,
    parent: Option<Box<Device>>,
}

impl Device {
    fn new(udev: &Udev, syspath: &str, action: Action, is_parent: bool) -> Self {
        let mut device = Device {
            udev: udev.clone(),
            syspath: syspath.to_string(),
            action,
            properties: EntryList::new(),
            sysattrs: EntryList::new(),
            tags: EntryList::new(),
            devlinks: EntryList::new(),
            parent: None,
        };
        if !is_parent && action != Action::Remove {
            classify::run_create_handler(&mut device);
        }
        device
    }

    /// Device handle for a path in the device namespace.
    pub fn from_syspath(udev: &Udev, syspath: &str) -> Self {
        Self::new(udev, syspath, Action::None, false)
    }

    /// Locate the character device node carrying the given device number.
    ///
    /// The device root is walked until a matching node is found; `None`
    /// when no present node carries that number.
    pub fn from_devnum(udev: &Udev, devnum: u64) -> Option<Self> {
        for entry in WalkDir::new(udev.dev_path())
            .min_depth(1)
            .follow_links(false)
        {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_char_device() {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if meta.rdev() == devnum {
                let syspath = entry.path().to_string_lossy();
                return Some(Self::from_syspath(udev, &syspath));
            }
        }
        None
    }

    /// Lookup by subsystem and device name is not supported on this host;
    /// always `None`.
    pub fn from_subsystem_sysname(_udev: &Udev, _subsystem: &str, _sysname: &str) -> Option<Self> {
        None
    }

    pub(crate) fn with_action(udev: &Udev, syspath: &str, action: Action) -> Self {
        Self::new(udev, syspath, action, false)
    }

    pub(crate) fn new_parent(udev: &Udev, syspath: &str) -> Self {
        Self::new(udev, syspath, Action::None, true)
    }

    pub fn udev(&self) -> &Udev {
        &self.udev
    }

    pub fn syspath(&self) -> &str {
        &self.syspath
    }

    /// Leaf name of the device path.
    pub fn sysname(&self) -> &str {
        basename(&self.syspath)
    }

    /// Trailing unit digits of the leaf name, if any.
    pub fn sysnum(&self) -> Option<&str> {
        sysnum(self.sysname())
    }

    /// Subsystem label, `None` for paths outside every known pattern.
    pub fn subsystem(&self) -> Option<&str> {
        self.udev.classifier().subsystem_of(&self.syspath)
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// The device node path, when the node still exists and is a
    /// character device. In this namespace it is the syspath itself.
    pub fn devnode(&self) -> Option<&Path> {
        let path = Path::new(&self.syspath);
        match fs::metadata(path) {
            Ok(meta) if meta.file_type().is_char_device() => Some(path),
            _ => None,
        }
    }

    /// Raw device number of the node, `None` once the node is gone or is
    /// not a character device.
    pub fn devnum(&self) -> Option<u64> {
        match fs::metadata(&self.syspath) {
            Ok(meta) if meta.file_type().is_char_device() => Some(meta.rdev()),
            _ => None,
        }
    }

    /// Synthesized parent describing the upstream attachment point.
    pub fn parent(&self) -> Option<&Device> {
        self.parent.as_deref()
    }

    pub(crate) fn set_parent(&mut self, parent: Device) {
        self.parent = Some(Box::new(parent));
    }

    pub fn properties(&self) -> &EntryList {
        &self.properties
    }

    pub fn sysattrs(&self) -> &EntryList {
        &self.sysattrs
    }

    pub fn tags(&self) -> &EntryList {
        &self.tags
    }

    pub fn devlinks(&self) -> &EntryList {
        &self.devlinks
    }

    /// First-match property lookup.
    pub fn property_value(&self, property: &str) -> Option<&str> {
        self.properties.get(property)
    }

    /// First-match static attribute lookup.
    pub fn sysattr_value(&self, sysattr: &str) -> Option<&str> {
        self.sysattrs.get(sysattr)
    }

    pub(crate) fn properties_mut(&mut self) -> &mut EntryList {
        &mut self.properties
    }

    pub(crate) fn sysattrs_mut(&mut self) -> &mut EntryList {
        &mut self.sysattrs
    }

    /// Devices are initialized as soon as they are constructed.
    pub fn is_initialized(&self) -> bool {
        true
    }

    /// Driver metadata is not exposed by this host; always `None`.
    pub fn driver(&self) -> Option<&str> {
        None
    }

    /// Device types are not exposed by this host; always `None`.
    pub fn devtype(&self) -> Option<&str> {
        None
    }

    /// Event sequence numbers are not tracked; always zero.
    pub fn seqnum(&self) -> u64 {
        0
    }
}
