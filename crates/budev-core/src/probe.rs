// Budev Host Probes
// Seams to the host: input capability probing, the kernel configuration
// database and the optional native device topology tree

use std::io;
use std::path::Path;

/// Capability summary of one input device node.
///
/// Produced by an [`InputProbe`] and consumed by the classifier; the fields
/// mirror the event-device capability bits the classification rules look at.
#[derive(Debug, Clone, Default)]
pub struct InputCaps {
    /// Host-reported device name.
    pub name: String,
    /// Physical-location string, when the host exposes one.
    pub phys: Option<String>,
    pub bus: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    /// Absolute X/Y position axes.
    pub abs_x: bool,
    pub abs_y: bool,
    /// Relative X/Y motion axes.
    pub rel_x: bool,
    pub rel_y: bool,
    pub btn_touch: bool,
    pub btn_tool_finger: bool,
    pub btn_stylus: bool,
    pub btn_tool_pen: bool,
    /// Generic (left) mouse button.
    pub btn_mouse: bool,
    /// Every key code from ESC through D is present.
    pub keyboard_keys: bool,
}

/// Inspects an input device node and reports its capabilities.
///
/// Returning `None` (node unreadable, not an event device, probing not
/// supported on this host) leaves the device unclassified.
pub trait InputProbe: Send + Sync {
    fn probe(&self, devnode: &Path) -> Option<InputCaps>;
}

/// Keyed string lookups against the kernel configuration database.
pub trait KernConf: Send + Sync {
    /// Value for a `dev.<driver>.<unit>.<field>` style key, or `None` when
    /// the key does not resolve.
    fn query(&self, key: &str) -> Option<String>;
}

/// Native device topology tree, when the host offers one.
///
/// Installing a tree on the context enables attach/detach event lines and
/// the enumerator's second scan pass.
pub trait DeviceTree: Send + Sync {
    /// Visit the name of every attached device in the tree.
    fn visit_attached(&self, visit: &mut dyn FnMut(&str)) -> io::Result<()>;
}

/// Probe that reports nothing; used where event-device support is absent.
#[derive(Debug, Default)]
pub struct NullInputProbe;

impl InputProbe for NullInputProbe {
    fn probe(&self, _devnode: &Path) -> Option<InputCaps> {
        None
    }
}

/// Configuration source that resolves no keys.
#[derive(Debug, Default)]
pub struct NullKernConf;

impl KernConf for NullKernConf {
    fn query(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Capability probe backed by the event-device interface.
#[cfg(feature = "evdev")]
#[derive(Debug, Default)]
pub struct EvdevProbe;

#[cfg(feature = "evdev")]
impl InputProbe for EvdevProbe {
    fn probe(&self, devnode: &Path) -> Option<InputCaps> {
        use evdev::{AbsoluteAxisType, Device, Key, RelativeAxisType};

        let device = match Device::open(devnode) {
            Ok(d) => d,
            Err(err) => {
                log::debug!("could not open {} for probing: {}", devnode.display(), err);
                return None;
            }
        };

        let keys = device.supported_keys();
        let abs = device.supported_absolute_axes();
        let rel = device.supported_relative_axes();
        let has_key = |k: Key| keys.as_ref().map_or(false, |s| s.contains(k));
        let keyboard_keys = keys.as_ref().map_or(false, |s| {
            (Key::KEY_ESC.code()..=Key::KEY_D.code()).all(|c| s.contains(Key::new(c)))
        });
        let id = device.input_id();

        Some(InputCaps {
            name: device.name().unwrap_or("").to_string(),
            phys: device.physical_path().map(str::to_string),
            bus: id.bus_type().0,
            vendor: id.vendor(),
            product: id.product(),
            version: id.version(),
            abs_x: abs
                .as_ref()
                .map_or(false, |s| s.contains(AbsoluteAxisType::ABS_X)),
            abs_y: abs
                .as_ref()
                .map_or(false, |s| s.contains(AbsoluteAxisType::ABS_Y)),
            rel_x: rel
                .as_ref()
                .map_or(false, |s| s.contains(RelativeAxisType::REL_X)),
            rel_y: rel
                .as_ref()
                .map_or(false, |s| s.contains(RelativeAxisType::REL_Y)),
            btn_touch: has_key(Key::BTN_TOUCH),
            btn_tool_finger: has_key(Key::BTN_TOOL_FINGER),
            btn_stylus: has_key(Key::BTN_STYLUS),
            btn_tool_pen: has_key(Key::BTN_TOOL_PEN),
            btn_mouse: has_key(Key::BTN_LEFT),
            keyboard_keys,
        })
    }
}

/// Configuration source backed by the host's sysctl database.
#[cfg(target_os = "freebsd")]
#[derive(Debug, Default)]
pub struct SysctlConf;

#[cfg(target_os = "freebsd")]
impl KernConf for SysctlConf {
    fn query(&self, key: &str) -> Option<String> {
        use std::ffi::CString;

        let name = CString::new(key).ok()?;
        let mut buf = [0u8; 1024];
        let mut len = buf.len();
        let rc = unsafe {
            libc::sysctlbyname(
                name.as_ptr(),
                buf.as_mut_ptr() as *mut libc::c_void,
                &mut len,
                std::ptr::null(),
                0,
            )
        };
        if rc != 0 {
            return None;
        }
        let end = buf[..len].iter().position(|&b| b == 0).unwrap_or(len);
        Some(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_probe_reports_nothing() {
        assert!(NullInputProbe.probe(Path::new("/dev/input/event0")).is_none());
    }

    #[test]
    fn test_null_kern_conf_resolves_nothing() {
        assert!(NullKernConf.query("dev.atkbd.0.%desc").is_none());
    }
}
