// Budev Filter Chain
// Shell-glob match rules over subsystem labels and device names

use regex::Regex;

use crate::context::Udev;
use crate::util::basename;

/// What part of a device identity a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterKind {
    Subsystem,
    Sysname,
}

#[derive(Debug, Clone)]
struct FilterRule {
    kind: FilterKind,
    negate: bool,
    pattern: Glob,
}

/// Ordered rule set with two-pass match semantics.
///
/// Pass one sets the result to true iff at least one non-negated rule
/// matches; pass two forces it back to false if any negated rule matches.
/// A chain with no positive rules therefore matches *nothing*: adding only
/// negated rules does not mean "everything except". Callers depend on this
/// and it is covered by tests; do not "fix" it.
#[derive(Debug, Clone, Default)]
pub(crate) struct FilterChain {
    rules: Vec<FilterRule>,
}

impl FilterChain {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, kind: FilterKind, negate: bool, pattern: &str) {
        self.rules.push(FilterRule {
            kind,
            negate,
            pattern: Glob::new(pattern),
        });
    }

    /// Test a device path against the chain.
    ///
    /// Paths that resolve to no known subsystem are excluded outright,
    /// before any rule is consulted.
    pub(crate) fn matches(&self, udev: &Udev, syspath: &str) -> bool {
        let Some(subsystem) = udev.classifier().subsystem_of(syspath) else {
            return false;
        };
        let sysname = basename(syspath);

        let mut result = false;
        for rule in self.rules.iter().filter(|r| !r.negate) {
            let text = match rule.kind {
                FilterKind::Subsystem => subsystem,
                FilterKind::Sysname => sysname,
            };
            if rule.pattern.matches(text) {
                result = true;
                break;
            }
        }

        for rule in self.rules.iter().filter(|r| r.negate) {
            let text = match rule.kind {
                FilterKind::Subsystem => subsystem,
                FilterKind::Sysname => sysname,
            };
            if rule.pattern.matches(text) {
                result = false;
                break;
            }
        }

        result
    }
}

/// A shell glob compiled to an anchored regular expression.
///
/// `*` matches any run of characters (including `/`), `?` any single
/// character, and `[...]`/`[!...]` character classes carry over directly.
/// An unterminated class is taken literally.
#[derive(Debug, Clone)]
pub(crate) struct Glob {
    re: Regex,
}

impl Glob {
    pub(crate) fn new(pattern: &str) -> Self {
        // The translation only emits well-formed regex syntax, so
        // compilation cannot fail.
        let re = Regex::new(&translate(pattern)).unwrap_or_else(|_| {
            Regex::new(&format!("^{}$", regex::escape(pattern))).expect("literal pattern")
        });
        Self { re }
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        self.re.is_match(text)
    }
}

fn translate(pattern: &str) -> String {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("^(?s:");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                i += translate_class(&chars[i..], &mut re);
                continue;
            }
            c => push_literal(&mut re, c),
        }
        i += 1;
    }
    re.push_str(")$");
    re
}

/// Translate one `[...]` class starting at `chars[0]`; returns how many
/// input characters were consumed. Falls back to a literal `[` when the
/// class never closes.
fn translate_class(chars: &[char], re: &mut String) -> usize {
    let mut j = 1;
    let negated = chars.get(j) == Some(&'!');
    if negated {
        j += 1;
    }
    let body_start = j;
    // A `]` directly after the opening (or the `!`) is a literal member.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += 1;
    }
    if j >= chars.len() {
        push_literal(re, '[');
        return 1;
    }

    re.push('[');
    if negated {
        re.push('^');
    }
    for &c in &chars[body_start..j] {
        match c {
            '\\' | '^' | ']' | '[' => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
    }
    re.push(']');
    j + 1
}

fn push_literal(re: &mut String, c: char) {
    if c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | ' ' | ':' | ',' | '=') {
        re.push(c);
    } else {
        re.push_str(&regex::escape(&c.to_string()));
    }
}
