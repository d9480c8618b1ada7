//! VM configuration (`.vmx`) patching.
//!
//! A `.vmx` file is a flat list of `key = "value"` lines. Publishing an
//! environment drops the keys a previous publish wrote and appends a fresh
//! block at the end; every other line is kept verbatim and in order.

use crate::adapters::IsoBuilder;
use crate::error::{Result, VappError};
use crate::ovfenv::OvfEnv;
use crate::paths;
use crate::types::TransportSet;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Device types that make a slot an optical drive.
const CDROM_TYPES: [&str; 3] = ["atapi-cdrom", "cdrom-raw", "cdrom-image"];

/// Keys of a previous publish that are always dropped.
const OVF_KEYS: [&str; 2] = ["guestinfo.ovfenv", "msg.autoanswer"];

/// Per-device keys replaced when wiring the environment ISO.
const DEVICE_KEYS: [&str; 5] = ["filename", "devicetype", "autodetect", "startconnected", "present"];

/// Parsed entries: lower-cased keys to lower-cased, unquoted values.
pub type VmxEntries = HashMap<String, String>;

/// Escape a string for use inside a quoted `.vmx` value.
///
/// `#`, `|`, `\`, `"` and control characters become `|NN` (two lower-case hex
/// digits).
pub fn vmx_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '#' | '|' | '\\' | '"') || (c as u32) < 32 {
            let _ = write!(out, "|{:02x}", c as u32);
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a line on its first `=` into a lower-cased `(key, value)` pair.
pub fn split_entry(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim().to_lowercase()))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Read a `.vmx` file into a key/value map. Later entries win.
pub fn read_vmx(path: &Path) -> Result<VmxEntries> {
    let content = std::fs::read_to_string(path).map_err(|e| VappError::io(path, e))?;
    Ok(parse_entries(&content))
}

fn parse_entries(content: &str) -> VmxEntries {
    content
        .lines()
        .filter_map(split_entry)
        .map(|(k, v)| {
            let v = unquote(&v).to_string();
            (k, v)
        })
        .collect()
}

fn entry<'a>(entries: &'a VmxEntries, dev: &str, key: &str) -> &'a str {
    entries.get(&format!("{}.{}", dev, key)).map(String::as_str).unwrap_or("")
}

fn entry_bool(entries: &VmxEntries, dev: &str, key: &str) -> bool {
    entry(entries, dev, key) == "true"
}

fn device_slots() -> impl Iterator<Item = String> {
    let ide = (0..2).flat_map(|x| (0..2).map(move |y| format!("ide{}:{}", x, y)));
    let scsi = (0..8).flat_map(|x| (0..8).map(move |y| format!("scsi{}:{}", x, y)));
    ide.chain(scsi)
}

fn is_cdrom(entries: &VmxEntries, dev: &str) -> bool {
    entry_bool(entries, dev, "present") && CDROM_TYPES.contains(&entry(entries, dev, "devicetype"))
}

fn is_mounting_ovf_env(entries: &VmxEntries, dev: &str) -> bool {
    entry(entries, dev, "devicetype") == "cdrom-image"
        && entry(entries, dev, "filename") == paths::OVF_ENV_ISO_NAME
}

fn is_candidate(entries: &VmxEntries, dev: &str) -> bool {
    !entry_bool(entries, dev, "startconnected")
        || (entry(entries, dev, "devicetype") == "cdrom-image" && entry(entries, dev, "filename").is_empty())
}

/// Pick the optical device slot to carry the environment ISO.
///
/// A device already mounting `ovf-env.iso` wins. Otherwise the first device
/// that is not connected at power-on, or is an image drive with no file, is
/// used.
pub fn detect_cdrom_device(entries: &VmxEntries) -> Option<String> {
    let mut candidate = None;
    for dev in device_slots().filter(|d| is_cdrom(entries, d)) {
        if is_mounting_ovf_env(entries, &dev) {
            return Some(dev);
        }
        if candidate.is_none() && is_candidate(entries, &dev) {
            candidate = Some(dev);
        }
    }
    candidate
}

/// Keys to drop and the block to append in one rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmxPatch {
    pub drop_keys: HashSet<String>,
    pub end_block: String,
}

impl VmxPatch {
    /// Patch publishing `document` through `transports`. `device` must be set
    /// when the ISO transport is used.
    pub fn publish(transports: TransportSet, device: Option<&str>, document: &str) -> Self {
        let mut patch = Self {
            drop_keys: OVF_KEYS.iter().map(|k| k.to_string()).collect(),
            end_block: String::new(),
        };

        if let (true, Some(dev)) = (transports.iso, device) {
            patch.drop_keys.extend(DEVICE_KEYS.iter().map(|k| format!("{}.{}", dev, k)));
            let _ = write!(
                patch.end_block,
                "\nmsg.autoAnswer = \"TRUE\"\n\
                 {dev}.fileName = \"{iso}\"\n\
                 {dev}.deviceType = \"cdrom-image\"\n\
                 {dev}.startConnected = \"TRUE\"\n\
                 {dev}.present = \"TRUE\"\n",
                dev = dev,
                iso = paths::OVF_ENV_ISO_NAME,
            );
        }

        if transports.guest_info {
            let _ = write!(patch.end_block, "\nguestinfo.ovfEnv = \"{}\"\n", vmx_escape(document));
        }
        patch
    }

    /// Patch marking `device` as not connected at power-on.
    pub fn disconnect(device: &str) -> Self {
        Self {
            drop_keys: [format!("{}.startconnected", device)].into_iter().collect(),
            end_block: format!("{}.startConnected = \"FALSE\"", device),
        }
    }

    /// Apply to file content. Retained lines keep their terminators; the
    /// appended block uses the file's line ending.
    pub fn apply(&self, content: &str) -> String {
        let eol = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let mut out = String::with_capacity(content.len() + self.end_block.len() + 2);
        for line in content.split_inclusive('\n') {
            if let Some((key, _)) = split_entry(line.trim_end_matches(['\r', '\n'])) {
                if self.drop_keys.contains(&key) {
                    continue;
                }
            }
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push_str(eol);
            }
        }
        out.push_str(&self.end_block.replace('\n', eol));
        out.push_str(eol);
        out
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Rewrite `path` through `patch`.
///
/// The new content goes to `<vmx>.rewritten` first; the previous file is kept as
/// `<vmx>.old`, replacing any earlier backup.
pub fn rewrite_vmx_file(path: &Path, patch: &VmxPatch) -> Result<()> {
    let content = std::fs::read_to_string(path).map_err(|e| VappError::io(path, e))?;

    let rewritten = with_suffix(path, ".rewritten");
    std::fs::write(&rewritten, patch.apply(&content)).map_err(|e| VappError::io(&rewritten, e))?;

    let old = with_suffix(path, ".old");
    match std::fs::remove_file(&old) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(VappError::io(&old, e)),
    }
    std::fs::rename(path, &old).map_err(|e| VappError::io(path, e))?;
    std::fs::rename(&rewritten, path).map_err(|e| VappError::io(&rewritten, e))?;
    debug!("Rewrote {:?}", path);
    Ok(())
}

/// Publish an environment document to the VM configured by `vmx`.
///
/// With the ISO transport the document is written to `ovf-env.iso` (and a
/// plain `ovf-env.xml` copy) beside the `.vmx`, and an optical drive is wired
/// to it. With the guest-info transport it is inlined into the `.vmx`.
#[instrument(skip(env, iso), fields(entity = %env.id))]
pub async fn publish_environment(
    vmx: &Path,
    env: &OvfEnv,
    transports: TransportSet,
    iso: &dyn IsoBuilder,
) -> Result<()> {
    let document = env.create_doc();
    let dir = vmx.parent().unwrap_or_else(|| Path::new("."));

    let device = if transports.iso {
        let dev = detect_cdrom_device(&read_vmx(vmx)?)
            .ok_or_else(|| VappError::NoCdromDevice { vmx: vmx.to_path_buf() })?;

        iso.build(&document, &dir.join(paths::OVF_ENV_ISO_NAME)).await?;
        let xml_copy = dir.join(paths::OVF_ENV_XML_NAME);
        std::fs::write(&xml_copy, &document).map_err(|e| VappError::io(&xml_copy, e))?;
        Some(dev)
    } else {
        None
    };

    rewrite_vmx_file(vmx, &VmxPatch::publish(transports, device.as_deref(), &document))?;
    metrics::counter!("vapprun_env_published_total").increment(1);
    info!("Published environment to {:?}", vmx);
    Ok(())
}

/// Stop connecting the environment ISO at power-on. No-op when the ISO
/// transport is not used or no drive is found.
pub fn disconnect_ovf_iso(vmx: &Path, transports: TransportSet) -> Result<()> {
    if !transports.iso {
        return Ok(());
    }
    match detect_cdrom_device(&read_vmx(vmx)?) {
        Some(dev) => rewrite_vmx_file(vmx, &VmxPatch::disconnect(&dev)),
        None => Ok(()),
    }
}
