// Budev Context
// Shared library context: configuration, classifier table and host probes

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::classify::Classifier;
use crate::probe::{DeviceTree, InputProbe, KernConf};

#[cfg(feature = "evdev")]
use crate::probe::EvdevProbe;
#[cfg(not(feature = "evdev"))]
use crate::probe::NullInputProbe;
#[cfg(not(target_os = "freebsd"))]
use crate::probe::NullKernConf;

const DEFAULT_DEV_ROOT: &str = "/dev";
const DEFAULT_DEVD_SOCKET: &str = "/var/run/devd.pipe";

/// Shared context every device, enumerator and monitor hangs off.
///
/// Cheap to clone; all clones refer to the same configuration, classifier
/// table and user data slot. The classifier table is built once at
/// construction and immutable afterwards.
#[derive(Clone)]
pub struct Udev {
    inner: Arc<Inner>,
}

struct Inner {
    dev_root: PathBuf,
    devd_socket: PathBuf,
    classifier: Classifier,
    input_probe: Box<dyn InputProbe>,
    kern_conf: Box<dyn KernConf>,
    device_tree: Option<Box<dyn DeviceTree>>,
    userdata: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl Udev {
    /// Context with default paths and host-native probes.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> UdevBuilder {
        UdevBuilder::default()
    }

    /// Root of the device-node namespace.
    pub fn dev_path(&self) -> &Path {
        &self.inner.dev_root
    }

    /// Path of the device-event broadcast socket.
    pub fn devd_socket(&self) -> &Path {
        &self.inner.devd_socket
    }

    /// Attach arbitrary caller data to the context.
    pub fn set_userdata(&self, data: Option<Arc<dyn Any + Send + Sync>>) {
        *self.inner.userdata.lock() = data;
    }

    /// Caller data previously attached with [`Udev::set_userdata`].
    pub fn userdata(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.userdata.lock().clone()
    }

    pub(crate) fn classifier(&self) -> &Classifier {
        &self.inner.classifier
    }

    pub(crate) fn input_probe(&self) -> &dyn InputProbe {
        self.inner.input_probe.as_ref()
    }

    pub(crate) fn kern_conf(&self) -> &dyn KernConf {
        self.inner.kern_conf.as_ref()
    }

    pub(crate) fn device_tree(&self) -> Option<&dyn DeviceTree> {
        self.inner.device_tree.as_deref()
    }

    /// Whether a native device topology tree is installed.
    pub fn has_device_tree(&self) -> bool {
        self.inner.device_tree.is_some()
    }
}

impl Default for Udev {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Udev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Udev")
            .field("dev_root", &self.inner.dev_root)
            .field("devd_socket", &self.inner.devd_socket)
            .field("device_tree", &self.inner.device_tree.is_some())
            .finish()
    }
}

/// Builder for [`Udev`]; paths and host probes can be overridden before
/// the classifier table is frozen.
#[derive(Default)]
pub struct UdevBuilder {
    dev_root: Option<PathBuf>,
    devd_socket: Option<PathBuf>,
    input_probe: Option<Box<dyn InputProbe>>,
    kern_conf: Option<Box<dyn KernConf>>,
    device_tree: Option<Box<dyn DeviceTree>>,
}

impl UdevBuilder {
    pub fn dev_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.dev_root = Some(path.into());
        self
    }

    pub fn devd_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.devd_socket = Some(path.into());
        self
    }

    pub fn input_probe(mut self, probe: impl InputProbe + 'static) -> Self {
        self.input_probe = Some(Box::new(probe));
        self
    }

    pub fn kern_conf(mut self, conf: impl KernConf + 'static) -> Self {
        self.kern_conf = Some(Box::new(conf));
        self
    }

    pub fn device_tree(mut self, tree: impl DeviceTree + 'static) -> Self {
        self.device_tree = Some(Box::new(tree));
        self
    }

    pub fn build(self) -> Udev {
        let dev_root = self
            .dev_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEV_ROOT));
        let classifier = Classifier::new(&dev_root);
        Udev {
            inner: Arc::new(Inner {
                classifier,
                dev_root,
                devd_socket: self
                    .devd_socket
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVD_SOCKET)),
                input_probe: self.input_probe.unwrap_or_else(default_input_probe),
                kern_conf: self.kern_conf.unwrap_or_else(default_kern_conf),
                device_tree: self.device_tree,
                userdata: Mutex::new(None),
            }),
        }
    }
}

fn default_input_probe() -> Box<dyn InputProbe> {
    #[cfg(feature = "evdev")]
    {
        Box::new(EvdevProbe)
    }
    #[cfg(not(feature = "evdev"))]
    {
        Box::new(NullInputProbe)
    }
}

fn default_kern_conf() -> Box<dyn KernConf> {
    #[cfg(target_os = "freebsd")]
    {
        Box::new(crate::probe::SysctlConf)
    }
    #[cfg(not(target_os = "freebsd"))]
    {
        Box::new(NullKernConf)
    }
}
