//! Object inventories: the intersphinx wire format.
//!
//! The format is a four-line text header followed by a zlib-compressed
//! payload of lines
//!
//! ```text
//! name domain:role priority url display-name
//! ```
//!
//! Spaces are separators, but the name and display columns may contain
//! spaces; the numeric priority column is the reference point for
//! splitting, like the de-facto reference loader does. This module reads
//! and emits the format bit-compatibly.

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use descry_core::{EntityKind, ExternalHit, ExternalLookup, Privacy, System};

use crate::linker::url_for;

/// Header magic of the only supported version.
const HEADER_V2: &str = "# Sphinx inventory version 2";

// ============================================================================
// Error Types
// ============================================================================

/// Errors from reading an inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("unsupported inventory header: {found}")]
    UnsupportedVersion { found: String },

    #[error("truncated inventory: {reason}")]
    Truncated { reason: String },

    #[error("failed to decompress inventory payload: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("inventory payload is not valid UTF-8")]
    Encoding,
}

/// Result type for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

// ============================================================================
// Reading
// ============================================================================

/// One parsed inventory line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub role: String,
    pub location: String,
    pub display: String,
}

/// A loaded external inventory.
#[derive(Debug, Clone)]
pub struct SphinxInventory {
    name: String,
    base_url: String,
    project: String,
    version: String,
    entries: HashMap<String, InventoryEntry>,
}

impl SphinxInventory {
    /// Parse raw `objects.inv` bytes. Lines for other domains and
    /// malformed lines are skipped; the latter produce a warning through
    /// `on_bad_line`.
    pub fn parse(
        name: &str,
        base_url: &str,
        bytes: &[u8],
        mut on_bad_line: impl FnMut(&str),
    ) -> InventoryResult<Self> {
        let mut lines = header_lines(bytes)?;
        let first = lines.next_line()?;
        if first.trim() != HEADER_V2 {
            return Err(InventoryError::UnsupportedVersion {
                found: first.trim().to_string(),
            });
        }
        let project = lines
            .next_line()?
            .trim()
            .trim_start_matches("# Project:")
            .trim()
            .to_string();
        let version = lines
            .next_line()?
            .trim()
            .trim_start_matches("# Version:")
            .trim()
            .to_string();
        let compression_note = lines.next_line()?;
        if !compression_note.contains("zlib") {
            return Err(InventoryError::UnsupportedVersion {
                found: compression_note.trim().to_string(),
            });
        }

        let mut payload = String::new();
        ZlibDecoder::new(lines.rest()).read_to_string(&mut payload)?;

        let mut entries = HashMap::new();
        for line in payload.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_inventory_line(line) {
                Some((name, role, _prio, location, display)) => {
                    // Only references of the source language's domain.
                    if !role.starts_with("py:") {
                        continue;
                    }
                    entries.insert(
                        name.to_string(),
                        InventoryEntry {
                            role: role.to_string(),
                            location: location.to_string(),
                            display: display.to_string(),
                        },
                    );
                }
                None => on_bad_line(line),
            }
        }

        Ok(SphinxInventory {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project,
            version,
            entries,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absolute link for an exact name, applying the `$` convention: a
    /// location ending in `$` stands for "append the full name".
    pub fn get_link(&self, target: &str) -> Option<String> {
        let entry = self.entries.get(target)?;
        let location = if let Some(stem) = entry.location.strip_suffix('$') {
            format!("{stem}{target}")
        } else {
            entry.location.clone()
        };
        Some(format!("{}/{}", self.base_url, location))
    }
}

/// Split a payload line on the numeric priority column.
fn parse_inventory_line(line: &str) -> Option<(&str, &str, i64, &str, &str)> {
    let parts: Vec<&str> = line.split(' ').collect();
    let mut prio_idx = 2;
    let prio = loop {
        if prio_idx >= parts.len() {
            return None;
        }
        match parts[prio_idx].parse::<i64>() {
            Ok(p) => break p,
            Err(_) => prio_idx += 1,
        }
    };
    if prio_idx < 2 || prio_idx + 2 > parts.len() {
        return None;
    }
    let name_len: usize =
        parts[..prio_idx - 1].iter().map(|p| p.len()).sum::<usize>() + (prio_idx - 2);
    let name = &line[..name_len];
    let role = parts[prio_idx - 1];
    let location = *parts.get(prio_idx + 1)?;
    let display_offset = prio_idx + 2;
    if display_offset >= parts.len() {
        return None;
    }
    let display_len: usize = parts[display_offset..]
        .iter()
        .map(|p| p.len() + 1)
        .sum::<usize>()
        - 1;
    let display = &line[line.len() - display_len..];
    if display.is_empty() {
        return None;
    }
    Some((name, role, prio, location, display))
}

// ============================================================================
// Inventory sets
// ============================================================================

/// All loaded inventories, queried in load order.
#[derive(Debug, Default)]
pub struct InventorySet {
    inventories: Vec<SphinxInventory>,
}

impl InventorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, inventory: SphinxInventory) {
        self.inventories.push(inventory);
    }

    pub fn is_empty(&self) -> bool {
        self.inventories.is_empty()
    }
}

impl ExternalLookup for InventorySet {
    fn lookup(&self, name: &str) -> Option<ExternalHit> {
        for inventory in &self.inventories {
            if let Some(url) = inventory.get_link(name) {
                return Some(ExternalHit {
                    inventory: inventory.name.clone(),
                    name: name.to_string(),
                    url,
                });
            }
        }
        None
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Emit this project's inventory. Entities iterate in registry order, so
/// the output is byte-identical across runs; HIDDEN entities are omitted.
pub fn write_inventory(
    system: &System,
    project: &str,
    version: &str,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    write!(
        out,
        "{HEADER_V2}\n# Project: {project}\n# Version: {version}\n# The remainder of this file is compressed using zlib.\n"
    )?;
    let mut encoder = ZlibEncoder::new(out, Compression::default());
    for doc in system.iter() {
        if doc.privacy == Privacy::Hidden {
            continue;
        }
        let domain = inventory_domain(&doc.kind);
        let url = url_for(system, doc.id);
        writeln!(encoder, "{} py:{} -1 {} -", doc.qname, domain, url)?;
    }
    encoder.finish()?;
    Ok(())
}

/// Domain tag of an entity kind in the emitted inventory.
fn inventory_domain(kind: &EntityKind) -> &'static str {
    match kind {
        EntityKind::Package(_) | EntityKind::Module(_) => "module",
        EntityKind::Class(_) | EntityKind::Exception(_) => "class",
        EntityKind::Function(_) => "function",
        EntityKind::Method(_) | EntityKind::ClassMethod(_) | EntityKind::StaticMethod(_) => {
            "method"
        }
        EntityKind::Property(_)
        | EntityKind::Variable(_)
        | EntityKind::InstanceVariable(_)
        | EntityKind::ClassVariable(_)
        | EntityKind::Constant(_) => "attribute",
        EntityKind::TypeAlias(_) | EntityKind::TypeVariable(_) => "obj",
    }
}

// ============================================================================
// Header scanning
// ============================================================================

struct HeaderLines<'a> {
    bytes: &'a [u8],
    pos: usize,
}

fn header_lines(bytes: &[u8]) -> InventoryResult<HeaderLines<'_>> {
    Ok(HeaderLines { bytes, pos: 0 })
}

impl<'a> HeaderLines<'a> {
    /// The next text line of the header.
    fn next_line(&mut self) -> InventoryResult<&'a str> {
        let rest = &self.bytes[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| InventoryError::Truncated {
                reason: "missing header line".to_string(),
            })?;
        self.pos += end + 1;
        std::str::from_utf8(&rest[..end]).map_err(|_| InventoryError::Encoding)
    }

    /// Everything after the consumed header: the compressed payload.
    fn rest(self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descry_core::{ClassData, FunctionData, ModuleData};

    fn make_inventory(payload: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        write!(
            bytes,
            "# Sphinx inventory version 2\n# Project: demo\n# Version: 1.0\n# The remainder of this file is compressed using zlib.\n"
        )
        .unwrap();
        let mut encoder = ZlibEncoder::new(&mut bytes, Compression::default());
        encoder.write_all(payload.as_bytes()).unwrap();
        encoder.finish().unwrap();
        bytes
    }

    #[test]
    fn parses_a_hand_built_inventory() {
        let bytes = make_inventory(
            "api.Widget py:class 1 api/widget.html#Widget -\n\
             api.make py:function 1 api.html#make Factory helper\n\
             index std:doc -1 index.html Documentation index\n",
        );
        let inv =
            SphinxInventory::parse("demo", "https://demo.example/docs/", &bytes, |_| {}).unwrap();
        assert_eq!(inv.project(), "demo");
        assert_eq!(inv.version(), "1.0");
        // Non-py entries are ignored.
        assert_eq!(inv.len(), 2);
        assert_eq!(
            inv.get_link("api.Widget").as_deref(),
            Some("https://demo.example/docs/api/widget.html#Widget")
        );
        assert_eq!(inv.get_link("index"), None);
    }

    #[test]
    fn dollar_suffix_expands_to_the_full_name() {
        let bytes = make_inventory("os.path.join py:function 1 library/os.path.html#$ -\n");
        let inv = SphinxInventory::parse("py", "https://docs.python.org/3", &bytes, |_| {}).unwrap();
        assert_eq!(
            inv.get_link("os.path.join").as_deref(),
            Some("https://docs.python.org/3/library/os.path.html#os.path.join")
        );
    }

    #[test]
    fn names_with_spaces_split_on_the_priority_column() {
        let line = "some name py:label -1 page.html Display Name";
        let (name, role, prio, location, display) = parse_inventory_line(line).unwrap();
        assert_eq!(name, "some name");
        assert_eq!(role, "py:label");
        assert_eq!(prio, -1);
        assert_eq!(location, "page.html");
        assert_eq!(display, "Display Name");
    }

    #[test]
    fn malformed_lines_are_reported_not_fatal() {
        let bytes = make_inventory("no priority column here\napi.ok py:class 1 ok.html -\n");
        let mut bad = Vec::new();
        let inv = SphinxInventory::parse("demo", "https://x", &bytes, |line| {
            bad.push(line.to_string())
        })
        .unwrap();
        assert_eq!(inv.len(), 1);
        assert_eq!(bad, vec!["no priority column here".to_string()]);
    }

    #[test]
    fn bad_header_is_rejected() {
        let err = SphinxInventory::parse("x", "https://x", b"# Sphinx inventory version 1\n", |_| {});
        assert!(matches!(err, Err(InventoryError::UnsupportedVersion { .. })));
    }

    #[test]
    fn written_inventory_round_trips_through_the_parser() {
        let mut system = System::new();
        let pkg = system.add(None, "pkg", EntityKind::Package(ModuleData::default()));
        let cls = system.add(Some(pkg), "Widget", EntityKind::Class(ClassData::default()));
        let _method = system.add(Some(cls), "draw", EntityKind::Method(FunctionData::default()));
        let hidden = system.add(Some(pkg), "_secret", EntityKind::Module(ModuleData::default()));
        system.get_mut(hidden).privacy = Privacy::Hidden;

        let mut bytes = Vec::new();
        write_inventory(&system, "pkg", "2.0", &mut bytes).unwrap();
        let inv = SphinxInventory::parse("pkg", "https://pkg.example", &bytes, |_| {}).unwrap();
        assert_eq!(inv.project(), "pkg");
        assert_eq!(
            inv.get_link("pkg.Widget").as_deref(),
            Some("https://pkg.example/pkg.Widget.html")
        );
        assert_eq!(
            inv.get_link("pkg.Widget.draw").as_deref(),
            Some("https://pkg.example/pkg.Widget.html#draw")
        );
        // HIDDEN entities are omitted.
        assert_eq!(inv.get_link("pkg._secret"), None);
    }

    #[test]
    fn emission_is_deterministic() {
        let build = || {
            let mut system = System::new();
            let pkg = system.add(None, "pkg", EntityKind::Package(ModuleData::default()));
            system.add(Some(pkg), "alpha", EntityKind::Module(ModuleData::default()));
            system.add(Some(pkg), "beta", EntityKind::Module(ModuleData::default()));
            let mut bytes = Vec::new();
            write_inventory(&system, "pkg", "1.0", &mut bytes).unwrap();
            bytes
        };
        assert_eq!(build(), build());
    }
}
