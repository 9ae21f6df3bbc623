// Budev Device Classifier
// Table-driven creation handlers: input-type tagging and parent synthesis

use std::path::Path;

use crate::context::Udev;
use crate::devd::kern_prop_value;
use crate::device::Device;
use crate::filter::Glob;
use crate::probe::InputCaps;
use crate::util::{split_unit, truncate_comma};

const BUS_PCI: u32 = 0x01;
const BUS_USB: u32 = 0x03;
const BUS_VIRTUAL: u32 = 0x06;
const BUS_I8042: u32 = 0x11;

const PS2_KEYBOARD_VENDOR: u32 = 0x001;
const PS2_KEYBOARD_PRODUCT: u32 = 0x001;
const PS2_MOUSE_VENDOR: u32 = 0x002;
const PS2_MOUSE_GENERIC_PRODUCT: u32 = 0x001;

/// Coarse input device category derived from a device's capabilities or
/// from its driver name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputType {
    Keyboard,
    Mouse,
    Touchpad,
    Touchscreen,
    Joystick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    /// Probe the event node's capability bits.
    CapabilityProbe,
    /// Known driver type; parent built from kernel metadata.
    Keyboard,
    Mouse,
    Joystick,
    Touchpad,
    Touchscreen,
    /// Keyboard multiplexor with a fixed synthetic identity.
    KeyboardMux,
    /// Legacy system mouse with a fixed synthetic identity.
    SystemMouse,
}

struct ClassEntry {
    subsystem: &'static str,
    pattern: Glob,
    handler: Handler,
}

/// Ordered device classification table.
///
/// Built once per context from the configured device root. Path lookups
/// take the first glob match; unmatched paths belong to no subsystem and
/// receive no classification.
pub(crate) struct Classifier {
    entries: Vec<ClassEntry>,
}

impl Classifier {
    pub(crate) fn new(dev_root: &Path) -> Self {
        let root = dev_root.to_string_lossy();
        let entry = |glob: &str, handler| ClassEntry {
            subsystem: "input",
            pattern: Glob::new(&format!("{root}/{glob}")),
            handler,
        };

        let mut entries = Vec::new();
        #[cfg(feature = "evdev")]
        entries.push(entry("input/event[0-9]*", Handler::CapabilityProbe));
        entries.extend([
            entry("ukbd[0-9]*", Handler::Keyboard),
            entry("atkbd[0-9]*", Handler::Keyboard),
            entry("kbdmux[0-9]*", Handler::KeyboardMux),
            entry("ums[0-9]*", Handler::Mouse),
            entry("psm[0-9]*", Handler::Mouse),
            entry("joy[0-9]*", Handler::Joystick),
            entry("atp[0-9]*", Handler::Touchpad),
            entry("wsp[0-9]*", Handler::Touchpad),
            entry("uep[0-9]*", Handler::Touchscreen),
            entry("sysmouse", Handler::SystemMouse),
            entry("vboxguest", Handler::Mouse),
        ]);

        Self { entries }
    }

    fn lookup(&self, syspath: &str) -> Option<&ClassEntry> {
        self.entries.iter().find(|e| e.pattern.matches(syspath))
    }

    /// Subsystem label for a path, `None` when the path matches no table
    /// entry.
    pub(crate) fn subsystem_of(&self, syspath: &str) -> Option<&'static str> {
        self.lookup(syspath).map(|e| e.subsystem)
    }
}

/// Creation hook: run the first matching handler for a freshly built
/// device, if any.
pub(crate) fn run_create_handler(device: &mut Device) {
    let udev = device.udev().clone();
    let handler = match udev.classifier().lookup(device.syspath()) {
        Some(entry) => entry.handler,
        None => return,
    };

    match handler {
        Handler::CapabilityProbe => capability_handler(device, &udev),
        Handler::Keyboard => {
            tag_input(device, InputType::Keyboard);
            metadata_parent(device, &udev);
        }
        Handler::Mouse => {
            tag_input(device, InputType::Mouse);
            metadata_parent(device, &udev);
        }
        Handler::Joystick => {
            tag_input(device, InputType::Joystick);
            metadata_parent(device, &udev);
        }
        Handler::Touchpad => {
            tag_input(device, InputType::Touchpad);
            metadata_parent(device, &udev);
        }
        Handler::Touchscreen => {
            tag_input(device, InputType::Touchscreen);
            metadata_parent(device, &udev);
        }
        Handler::KeyboardMux => {
            tag_input(device, InputType::Keyboard);
            let sysname = device.sysname().to_string();
            attach_parent(
                device,
                &udev,
                &sysname,
                "System keyboard multiplexor",
                "6/1/1/0",
                None,
            );
        }
        Handler::SystemMouse => {
            tag_input(device, InputType::Mouse);
            let sysname = device.sysname().to_string();
            attach_parent(device, &udev, &sysname, "System mouse", "6/2/1/0", None);
        }
    }
}

/// Tag the input category onto the device's property list.
fn tag_input(device: &mut Device, input_type: InputType) {
    let props = device.properties_mut();
    props.insert("ID_INPUT", Some("1"));
    match input_type {
        InputType::Keyboard => {
            props.insert("ID_INPUT_KEY", Some("1"));
            props.insert("ID_INPUT_KEYBOARD", Some("1"));
        }
        InputType::Mouse => {
            props.insert("ID_INPUT_MOUSE", Some("1"));
        }
        InputType::Touchpad => {
            props.insert("ID_INPUT_MOUSE", Some("1"));
            props.insert("ID_INPUT_TOUCHPAD", Some("1"));
        }
        InputType::Touchscreen => {
            props.insert("ID_INPUT_TOUCHSCREEN", Some("1"));
        }
        InputType::Joystick => {
            props.insert("ID_INPUT_JOYSTICK", Some("1"));
        }
    }
}

/// Derive the input category from probed capability bits.
///
/// First match wins; stylus and pen signals veto the touch categories.
/// Touchscreens quite commonly do not advertise a finger tool signal,
/// hence the separate touch-button arm.
pub(crate) fn classify_caps(caps: &InputCaps) -> Option<InputType> {
    let abs_pos = caps.abs_x && caps.abs_y;
    let no_pen = !caps.btn_stylus && !caps.btn_tool_pen;

    if abs_pos && caps.btn_tool_finger && no_pen {
        Some(InputType::Touchpad)
    } else if abs_pos && caps.btn_touch && !caps.btn_tool_finger && no_pen {
        Some(InputType::Touchscreen)
    } else if caps.rel_x && caps.rel_y && caps.btn_mouse {
        Some(InputType::Mouse)
    } else if abs_pos && !caps.btn_tool_finger && no_pen && caps.btn_mouse {
        Some(InputType::Mouse)
    } else if caps.keyboard_keys {
        Some(InputType::Keyboard)
    } else {
        None
    }
}

/// Classify an event node by its capability bits and synthesize a parent
/// from the host capability descriptor.
fn capability_handler(device: &mut Device, udev: &Udev) {
    let caps = match udev.input_probe().probe(Path::new(device.syspath())) {
        Some(caps) => caps,
        None => return,
    };
    let input_type = match classify_caps(&caps) {
        Some(t) => t,
        None => return,
    };
    tag_input(device, input_type);

    // The parent is keyed by physical location; without one there is
    // nothing to anchor it to.
    let phys = match caps.phys.as_deref() {
        Some(p) => p.to_string(),
        None => return,
    };
    let name = truncate_comma(&caps.name).to_string();
    let product = format!(
        "{:x}/{:x}/{:x}/{:x}",
        caps.bus, caps.vendor, caps.product, caps.version
    );
    attach_parent(device, udev, &phys, &name, &product, None);
}

/// Build a parent from the kernel configuration database entries for the
/// device's driver and unit.
fn metadata_parent(device: &mut Device, udev: &Udev) {
    let sysname = device.sysname().to_string();
    let Some((driver, unit)) = split_unit(&sysname) else {
        return;
    };

    let conf = udev.kern_conf();
    let Some(desc) = conf.query(&format!("dev.{driver}.{unit}.%desc")) else {
        return;
    };
    let Some(pnpinfo) = conf.query(&format!("dev.{driver}.{unit}.%pnpinfo")) else {
        return;
    };
    let Some(parent_drv) = conf.query(&format!("dev.{driver}.{unit}.%parent")) else {
        return;
    };

    let name = truncate_comma(&desc).to_string();
    let vendor_s = kern_prop_value(&pnpinfo, "vendor");
    let product_s = kern_prop_value(&pnpinfo, "product");
    let device_s = kern_prop_value(&pnpinfo, "device");
    let pnp_id = kern_prop_value(&pnpinfo, "_HID")
        .filter(|v| *v != "none")
        .map(str::to_string);

    let (bus, vendor, product) = match (vendor_s, product_s, device_s) {
        (Some(v), Some(p), _) => (BUS_USB, parse_num(v), parse_num(p)),
        (Some(v), None, Some(d)) => (BUS_PCI, parse_num(v), parse_num(d)),
        _ if parent_drv == "atkbdc0" => match driver {
            "atkbd" => (BUS_I8042, PS2_KEYBOARD_VENDOR, PS2_KEYBOARD_PRODUCT),
            "psm" => (BUS_I8042, PS2_MOUSE_VENDOR, PS2_MOUSE_GENERIC_PRODUCT),
            _ => (BUS_I8042, 0, 0),
        },
        _ => (BUS_VIRTUAL, 0, 0),
    };

    let product = format!("{bus:x}/{vendor:x}/{product:x}/0");
    attach_parent(device, udev, &sysname, &name, &product, pnp_id.as_deref());
}

/// Synthesize and attach the parent device a display server reads vendor
/// and name strings from.
fn attach_parent(
    device: &mut Device,
    udev: &Udev,
    parent_path: &str,
    name: &str,
    product: &str,
    pnp_id: Option<&str>,
) {
    let mut parent = Device::new_parent(udev, parent_path);
    parent.properties_mut().insert("NAME", Some(name));
    parent.sysattrs_mut().insert("name", Some(name));
    parent.properties_mut().insert("PRODUCT", Some(product));
    if let Some(id) = pnp_id {
        parent.sysattrs_mut().insert("id", Some(id));
    }
    device.set_parent(parent);
}

/// Numeric token parse with C `strtol(_, _, 0)` base selection: `0x`
/// prefix is hex, a bare leading zero is octal, everything else decimal.
/// Unparseable tokens read as zero.
fn parse_num(s: &str) -> u32 {
    let t = s.trim();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).unwrap_or(0)
    } else if t.len() > 1 && t.starts_with('0') {
        u32::from_str_radix(&t[1..], 8).unwrap_or(0)
    } else {
        t.parse().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Udev;
    use crate::device::Device;
    use crate::probe::{InputProbe, KernConf};
    use std::collections::HashMap;

    fn caps() -> InputCaps {
        InputCaps::default()
    }

    #[test]
    fn test_classify_touchpad() {
        let mut c = caps();
        c.abs_x = true;
        c.abs_y = true;
        c.btn_tool_finger = true;
        assert_eq!(classify_caps(&c), Some(InputType::Touchpad));
    }

    #[test]
    fn test_classify_touchpad_beats_touchscreen() {
        let mut c = caps();
        c.abs_x = true;
        c.abs_y = true;
        c.btn_tool_finger = true;
        c.btn_touch = true;
        assert_eq!(classify_caps(&c), Some(InputType::Touchpad));
    }

    #[test]
    fn test_classify_touchscreen() {
        let mut c = caps();
        c.abs_x = true;
        c.abs_y = true;
        c.btn_touch = true;
        assert_eq!(classify_caps(&c), Some(InputType::Touchscreen));
    }

    #[test]
    fn test_stylus_vetoes_touch_types() {
        let mut c = caps();
        c.abs_x = true;
        c.abs_y = true;
        c.btn_tool_finger = true;
        c.btn_stylus = true;
        assert_eq!(classify_caps(&c), None);
    }

    #[test]
    fn test_classify_relative_mouse() {
        let mut c = caps();
        c.rel_x = true;
        c.rel_y = true;
        c.btn_mouse = true;
        assert_eq!(classify_caps(&c), Some(InputType::Mouse));
    }

    #[test]
    fn test_classify_absolute_mouse() {
        let mut c = caps();
        c.abs_x = true;
        c.abs_y = true;
        c.btn_mouse = true;
        assert_eq!(classify_caps(&c), Some(InputType::Mouse));
    }

    #[test]
    fn test_classify_keyboard() {
        let mut c = caps();
        c.keyboard_keys = true;
        assert_eq!(classify_caps(&c), Some(InputType::Keyboard));
    }

    #[test]
    fn test_classify_nothing() {
        assert_eq!(classify_caps(&caps()), None);
    }

    #[test]
    fn test_parse_num_bases() {
        assert_eq!(parse_num("0x045e"), 0x045e);
        assert_eq!(parse_num("0X10"), 16);
        assert_eq!(parse_num("017"), 15);
        assert_eq!(parse_num("42"), 42);
        assert_eq!(parse_num("junk"), 0);
        assert_eq!(parse_num("0"), 0);
    }

    struct FakeProbe(InputCaps);

    impl InputProbe for FakeProbe {
        fn probe(&self, _devnode: &std::path::Path) -> Option<InputCaps> {
            Some(self.0.clone())
        }
    }

    struct FakeConf(HashMap<String, String>);

    impl KernConf for FakeConf {
        fn query(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    #[cfg(feature = "evdev")]
    #[test]
    fn test_capability_probe_tags_and_parent() {
        let probed = InputCaps {
            name: "Generic Mouse, rev 2".to_string(),
            phys: Some("usb-0:1.0".to_string()),
            bus: 0x03,
            vendor: 0x046d,
            product: 0xc077,
            version: 0x111,
            rel_x: true,
            rel_y: true,
            btn_mouse: true,
            ..InputCaps::default()
        };
        let udev = Udev::builder()
            .dev_root("/dev")
            .input_probe(FakeProbe(probed))
            .build();

        let dev = Device::from_syspath(&udev, "/dev/input/event0");
        assert_eq!(dev.property_value("ID_INPUT"), Some("1"));
        assert_eq!(dev.property_value("ID_INPUT_MOUSE"), Some("1"));

        let parent = dev.parent().expect("parent synthesized");
        assert_eq!(parent.syspath(), "usb-0:1.0");
        assert_eq!(parent.property_value("NAME"), Some("Generic Mouse"));
        assert_eq!(parent.sysattr_value("name"), Some("Generic Mouse"));
        assert_eq!(parent.property_value("PRODUCT"), Some("3/46d/c077/111"));
    }

    #[cfg(feature = "evdev")]
    #[test]
    fn test_capability_probe_without_phys_keeps_tags_only() {
        let probed = InputCaps {
            name: "Buttonpad".to_string(),
            phys: None,
            abs_x: true,
            abs_y: true,
            btn_tool_finger: true,
            ..InputCaps::default()
        };
        let udev = Udev::builder()
            .dev_root("/dev")
            .input_probe(FakeProbe(probed))
            .build();

        let dev = Device::from_syspath(&udev, "/dev/input/event2");
        assert_eq!(dev.property_value("ID_INPUT_TOUCHPAD"), Some("1"));
        assert!(dev.parent().is_none());
    }

    fn conf_for(driver: &str, unit: &str, desc: &str, pnpinfo: &str, parent: &str) -> FakeConf {
        let mut map = HashMap::new();
        map.insert(format!("dev.{driver}.{unit}.%desc"), desc.to_string());
        map.insert(format!("dev.{driver}.{unit}.%pnpinfo"), pnpinfo.to_string());
        map.insert(format!("dev.{driver}.{unit}.%parent"), parent.to_string());
        FakeConf(map)
    }

    #[test]
    fn test_metadata_parent_usb() {
        let udev = Udev::builder()
            .dev_root("/dev")
            .kern_conf(conf_for(
                "ums",
                "0",
                "Wired Mouse, 3 buttons",
                "vendor=0x046d product=0xc077 _HID=none",
                "uhub1",
            ))
            .build();

        let dev = Device::from_syspath(&udev, "/dev/ums0");
        assert_eq!(dev.property_value("ID_INPUT_MOUSE"), Some("1"));
        let parent = dev.parent().expect("parent synthesized");
        assert_eq!(parent.syspath(), "ums0");
        assert_eq!(parent.property_value("NAME"), Some("Wired Mouse"));
        assert_eq!(parent.property_value("PRODUCT"), Some("3/46d/c077/0"));
        assert_eq!(parent.sysattr_value("id"), None);
    }

    #[test]
    fn test_metadata_parent_pci_and_hid() {
        let udev = Udev::builder()
            .dev_root("/dev")
            .kern_conf(conf_for(
                "joy",
                "0",
                "Game port",
                "vendor=0x8086 device=0x24d0 _HID=PNP0F13",
                "pci0",
            ))
            .build();

        let dev = Device::from_syspath(&udev, "/dev/joy0");
        let parent = dev.parent().expect("parent synthesized");
        assert_eq!(parent.property_value("PRODUCT"), Some("1/8086/24d0/0"));
        assert_eq!(parent.sysattr_value("id"), Some("PNP0F13"));
    }

    #[test]
    fn test_metadata_parent_ps2_fallback() {
        let udev = Udev::builder()
            .dev_root("/dev")
            .kern_conf(conf_for(
                "atkbd",
                "0",
                "AT keyboard",
                "_HID=none",
                "atkbdc0",
            ))
            .build();

        let dev = Device::from_syspath(&udev, "/dev/atkbd0");
        let parent = dev.parent().expect("parent synthesized");
        assert_eq!(parent.property_value("PRODUCT"), Some("11/1/1/0"));
    }

    #[test]
    fn test_metadata_parent_virtual_fallback() {
        let udev = Udev::builder()
            .dev_root("/dev")
            .kern_conf(conf_for("ukbd", "0", "Virtual kbd", "", "nexus0"))
            .build();

        let dev = Device::from_syspath(&udev, "/dev/ukbd0");
        let parent = dev.parent().expect("parent synthesized");
        assert_eq!(parent.property_value("PRODUCT"), Some("6/0/0/0"));
    }

    #[test]
    fn test_metadata_parent_requires_all_keys() {
        // No configuration entries at all: tags applied, no parent.
        let udev = Udev::builder().dev_root("/dev").build();
        let dev = Device::from_syspath(&udev, "/dev/psm0");
        assert_eq!(dev.property_value("ID_INPUT_MOUSE"), Some("1"));
        assert!(dev.parent().is_none());
    }

    #[test]
    fn test_kbdmux_fixed_parent() {
        let udev = Udev::builder().dev_root("/dev").build();
        let dev = Device::from_syspath(&udev, "/dev/kbdmux0");
        assert_eq!(dev.property_value("ID_INPUT_KEYBOARD"), Some("1"));
        let parent = dev.parent().expect("parent synthesized");
        assert_eq!(parent.syspath(), "kbdmux0");
        assert_eq!(
            parent.property_value("NAME"),
            Some("System keyboard multiplexor")
        );
        assert_eq!(parent.property_value("PRODUCT"), Some("6/1/1/0"));
    }

    #[test]
    fn test_sysmouse_fixed_parent() {
        let udev = Udev::builder().dev_root("/dev").build();
        let dev = Device::from_syspath(&udev, "/dev/sysmouse");
        assert_eq!(dev.property_value("ID_INPUT_MOUSE"), Some("1"));
        let parent = dev.parent().expect("parent synthesized");
        assert_eq!(parent.property_value("NAME"), Some("System mouse"));
        assert_eq!(parent.property_value("PRODUCT"), Some("6/2/1/0"));
    }

    #[test]
    fn test_subsystem_resolution() {
        let udev = Udev::builder().dev_root("/dev").build();
        let table = udev.classifier();
        assert_eq!(table.subsystem_of("/dev/psm0"), Some("input"));
        assert_eq!(table.subsystem_of("/dev/sysmouse"), Some("input"));
        assert_eq!(table.subsystem_of("/dev/ttyu0"), None);
        assert_eq!(table.subsystem_of("psm0"), None);
    }
}
