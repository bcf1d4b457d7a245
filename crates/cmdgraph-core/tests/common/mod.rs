//! Shared fixtures: plugin directories with zip archives of module manifests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cmdgraph_core::command::{CommandGraph, DispatcherNode, TaggedMethodBuilder};
use cmdgraph_core::extension::{
    CodePath, CommandDetector, ExtensionRegistrar, ManifestRuntime, ModuleLoader, ModuleRuntime,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Write an archive at `dir/name` holding `entries` (entry name, body).
pub fn write_archive(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (entry, body) in entries {
        zip.start_file(*entry, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// Manifest of a module with one command method per alias list.
pub fn commands_manifest(commands: &[(&str, &[&str])]) -> String {
    let methods: Vec<serde_json::Value> = commands
        .iter()
        .map(|(name, aliases)| {
            serde_json::json!({
                "name": name,
                "command": { "aliases": aliases, "desc": format!("{name} command") }
            })
        })
        .collect();
    serde_json::json!({ "methods": methods }).to_string()
}

pub fn root_node() -> DispatcherNode {
    Arc::new(CommandGraph::new().with_builder(TaggedMethodBuilder::new())).commands()
}

pub fn registrar() -> ExtensionRegistrar {
    registrar_with(Arc::new(ManifestRuntime::default()), Arc::new(CodePath::new()))
}

pub fn registrar_with(
    runtime: Arc<dyn ModuleRuntime>,
    code_path: Arc<CodePath>,
) -> ExtensionRegistrar {
    ExtensionRegistrar::new(
        ModuleLoader::new(runtime, code_path),
        CommandDetector::default(),
        ".jar",
    )
}

/// Write a one-entry stored archive whose central directory declares
/// `declared_size` uncompressed bytes through a zip64 extra field, while the
/// entry really holds `body`.
pub fn write_archive_declaring_size(
    dir: &Path,
    name: &str,
    entry: &str,
    body: &[u8],
    declared_size: u64,
) -> PathBuf {
    fn u16le(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    fn u32le(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    let name_len = entry.len() as u16;
    let body_len = body.len() as u32;
    let mut out = Vec::new();

    // local file header
    u32le(&mut out, 0x0403_4b50);
    u16le(&mut out, 45); // version needed
    u16le(&mut out, 0); // flags
    u16le(&mut out, 0); // stored
    u16le(&mut out, 0); // time
    u16le(&mut out, 0); // date
    u32le(&mut out, 0); // crc
    u32le(&mut out, body_len);
    u32le(&mut out, body_len);
    u16le(&mut out, name_len);
    u16le(&mut out, 0);
    out.extend_from_slice(entry.as_bytes());
    out.extend_from_slice(body);

    // central directory header
    let cd_offset = out.len() as u32;
    u32le(&mut out, 0x0201_4b50);
    u16le(&mut out, 45); // version made by
    u16le(&mut out, 45); // version needed
    u16le(&mut out, 0);
    u16le(&mut out, 0);
    u16le(&mut out, 0);
    u16le(&mut out, 0);
    u32le(&mut out, 0);
    u32le(&mut out, body_len);
    u32le(&mut out, u32::MAX); // uncompressed size lives in the zip64 extra
    u16le(&mut out, name_len);
    u16le(&mut out, 12); // extra length
    u16le(&mut out, 0); // comment length
    u16le(&mut out, 0); // disk
    u16le(&mut out, 0); // internal attributes
    u32le(&mut out, 0); // external attributes
    u32le(&mut out, 0); // local header offset
    out.extend_from_slice(entry.as_bytes());
    u16le(&mut out, 0x0001); // zip64 extra
    u16le(&mut out, 8);
    out.extend_from_slice(&declared_size.to_le_bytes());
    let cd_size = out.len() as u32 - cd_offset;

    // end of central directory
    u32le(&mut out, 0x0605_4b50);
    u16le(&mut out, 0);
    u16le(&mut out, 0);
    u16le(&mut out, 1);
    u16le(&mut out, 1);
    u32le(&mut out, cd_size);
    u32le(&mut out, cd_offset);
    u16le(&mut out, 0);

    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, out).unwrap();
    path
}
