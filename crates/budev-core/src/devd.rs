// Budev Event Protocol
// Parsing of devd broadcast lines and kernel property blobs

use std::path::Path;

use crate::device::Action;

const EVENT_ATTACH: char = '+';
const EVENT_DETACH: char = '-';
const EVENT_NOTICE: char = '!';

/// Extract the value of a `key=value` token from a space-separated blob.
///
/// The key must sit at the start of the blob or directly after a space and
/// must be followed by `=`. Only the first occurrence of the key text is
/// considered. The value runs to the next space and may be empty.
pub(crate) fn kern_prop_value<'a>(buf: &'a str, prop: &str) -> Option<&'a str> {
    let pos = buf.find(prop)?;
    if pos != 0 && buf.as_bytes()[pos - 1] != b' ' {
        return None;
    }
    let rest = &buf[pos + prop.len()..];
    let value = rest.strip_prefix('=')?;
    Some(match value.find(' ') {
        Some(end) => &value[..end],
        None => value,
    })
}

/// True when the blob carries `prop=want` exactly.
pub(crate) fn kern_prop_matches(buf: &str, prop: &str, want: &str) -> bool {
    kern_prop_value(buf, prop) == Some(want)
}

/// Parse one broadcast line into an action and a device path.
///
/// Attach (`+`) and detach (`-`) lines are only meaningful when a native
/// device tree is available and take the path verbatim up to the first
/// space. Notice (`!`) lines must identify a DEVFS CDEV event; the path is
/// then the device root joined with the reported node name. Anything else,
/// including malformed or incomplete notices, produces no event.
pub(crate) fn parse_event_line(
    line: &str,
    dev_root: &Path,
    have_tree: bool,
) -> Option<(Action, String)> {
    let mut chars = line.chars();
    let sigil = chars.next()?;
    let body = chars.as_str();

    match sigil {
        EVENT_ATTACH | EVENT_DETACH => {
            if !have_tree {
                return None;
            }
            let action = if sigil == EVENT_ATTACH {
                Action::Add
            } else {
                Action::Remove
            };
            let path = body.split(' ').next().unwrap_or(body);
            Some((action, path.to_string()))
        }
        EVENT_NOTICE => {
            if !kern_prop_matches(body, "system", "DEVFS")
                || !kern_prop_matches(body, "subsystem", "CDEV")
            {
                return None;
            }
            let action = match kern_prop_value(body, "type")? {
                "CREATE" => Action::Add,
                "DESTROY" => Action::Remove,
                _ => return None,
            };
            let name = kern_prop_value(body, "cdev")?;
            if name.is_empty() {
                return None;
            }
            let path = dev_root.join(name).to_string_lossy().into_owned();
            Some((action, path))
        }
        _ => None,
    }
}
