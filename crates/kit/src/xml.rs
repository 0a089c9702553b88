//! Storage pool and volume XML descriptors
//!
//! Generates the minimal libvirt XML needed to define a directory pool and
//! create a raw volume, and reads the target path back out of a pool's
//! definition.

use camino::{Utf8Path, Utf8PathBuf};
use indoc::formatdoc;

/// Escape text content for inclusion in an XML element
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Descriptor for a directory-backed storage pool
pub fn pool_xml(name: &str, path: &Utf8Path) -> String {
    formatdoc! {r#"
        <pool type="dir">
          <name>{name}</name>
          <target>
            <path>{path}</path>
          </target>
        </pool>
        "#,
        name = escape(name),
        path = escape(path.as_str()),
    }
}

/// Descriptor for a volume of `capacity` bytes
pub fn volume_xml(name: &str, capacity: u64) -> String {
    formatdoc! {r#"
        <volume>
          <name>{name}</name>
          <capacity unit="bytes">{capacity}</capacity>
        </volume>
        "#,
        name = escape(name),
    }
}

/// Extract `<target><path>` from a pool's XML definition.
///
/// Returns `None` if the definition has no target path (e.g. network pools).
pub fn pool_target_path(xml: &str) -> Option<Utf8PathBuf> {
    let target = &xml[xml.find("<target>")?..];
    let target = &target[..target.find("</target>")?];
    let start = target.find("<path>")? + "<path>".len();
    let len = target[start..].find("</path>")?;
    let path = target[start..start + len].trim();
    if path.is_empty() {
        return None;
    }
    Some(Utf8PathBuf::from(unescape(path)))
}
