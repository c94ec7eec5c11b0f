//! Go service extractor.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use ignore::WalkBuilder;
use regex::Regex;
use tracing::{debug, info};

use super::scan::{string_literal, Masked};
use super::SourceExtractor;
use crate::error::ProbeError;
use crate::types::{DataModel, Endpoint, SourceModel};

/// Extracts endpoints, structs, SQL tables and bus topics from a Go tree.
///
/// Files under `vendor/` and `*_test.go` files are ignored. Files are
/// visited in file-name order so the resulting model is deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoSourceExtractor;

impl SourceExtractor for GoSourceExtractor {
    fn extract(&self, root: &Path) -> Result<SourceModel, ProbeError> {
        if !root.exists() {
            return Err(ProbeError::extraction(root, "path does not exist"));
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir && entry.depth() > 0 && entry.file_name() == "vendor")
            });

        let mut model = SourceModel::default();
        let mut files = 0usize;
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();
            if !entry.file_type().is_some_and(|t| t.is_file())
                || !name.ends_with(".go")
                || name.ends_with("_test.go")
            {
                continue;
            }
            let Ok(source) = std::fs::read_to_string(path) else {
                debug!(path = %path.display(), "skipping unreadable file");
                continue;
            };
            scan_file(&source, &mut model);
            files += 1;
        }

        info!(
            root = %root.display(),
            files,
            endpoints = model.endpoints.len(),
            models = model.models.len(),
            tables = model.tables.len(),
            topics = model.topics.len(),
            "source extracted"
        );
        Ok(model)
    }
}

/// Scan one Go file, appending what it declares to `model`.
pub(crate) fn scan_file(source: &str, model: &mut SourceModel) {
    let masked = Masked::new(source);
    collect_structs(&masked, &mut model.models);
    collect_calls(&masked, model);
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static extractor regex"))
}

fn call_site() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"\.(Get|Post|Put|Patch|Delete|HandleFunc|Exec|ExecContext|Query|QueryContext|QueryRow|QueryRowContext|CreateTopic|Publish)\s*\(",
    )
}

fn table_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)\b(?:FROM|INTO|UPDATE|JOIN|TABLE)\s+(\w+)")
}

fn handler_ident() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)*$")
}

fn collect_calls(masked: &Masked, model: &mut SourceModel) {
    for caps in call_site().captures_iter(&masked.mask) {
        let (Some(name), Some(whole)) = (caps.get(1), caps.get(0)) else {
            continue;
        };
        let args = masked.call_args(whole.end());
        match name.as_str() {
            method @ ("Get" | "Post" | "Put" | "Patch" | "Delete" | "HandleFunc") => {
                if args.len() < 2 {
                    continue;
                }
                let Some(path) = string_literal(args[0]) else {
                    continue;
                };
                let method = if method == "HandleFunc" {
                    "ANY".to_string()
                } else {
                    method.to_ascii_uppercase()
                };
                model
                    .endpoints
                    .push(Endpoint::new(method, path, handler_name(args[1].0)));
            }
            "CreateTopic" | "Publish" => {
                if let Some(topic) = args.first().and_then(|arg| string_literal(*arg)) {
                    model.topics.insert(topic.to_string());
                }
            }
            _ => {
                if let Some(sql) = args.iter().find_map(|arg| string_literal(*arg)) {
                    collect_tables(sql, &mut model.tables);
                }
            }
        }
    }
}

fn collect_tables(sql: &str, tables: &mut BTreeSet<String>) {
    for caps in table_ref().captures_iter(sql) {
        if let Some(table) = caps.get(1) {
            tables.insert(table.as_str().to_lowercase());
        }
    }
}

fn handler_name(arg: &str) -> String {
    if handler_ident().is_match(arg) {
        arg.to_string()
    } else if arg.starts_with("func") {
        "<anonymous>".to_string()
    } else {
        "<unknown>".to_string()
    }
}

fn type_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\btype\s+([A-Za-z_]\w*)(?:\[[^\]]*\])?\s+struct\s*\{")
}

fn type_group() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\btype\s*\(")
}

fn grouped_struct() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?m)^\s*([A-Za-z_]\w*)(?:\[[^\]]*\])?\s+struct\s*\{")
}

fn named_field() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^([A-Za-z_]\w*(?:\s*,\s*[A-Za-z_]\w*)*)\s+(\S[\s\S]*)$")
}

fn collect_structs(masked: &Masked, models: &mut Vec<DataModel>) {
    // (name, offset just past the opening brace)
    let mut starts: Vec<(String, usize)> = type_decl()
        .captures_iter(&masked.mask)
        .filter_map(|caps| Some((caps.get(1)?.as_str().to_string(), caps.get(0)?.end())))
        .collect();

    for group in type_group().find_iter(&masked.mask) {
        let Some(end) = masked.closing(group.end(), b'(', b')') else {
            continue;
        };
        let body = &masked.mask[group.end()..end];
        starts.extend(grouped_struct().captures_iter(body).filter_map(|caps| {
            Some((
                caps.get(1)?.as_str().to_string(),
                group.end() + caps.get(0)?.end(),
            ))
        }));
    }
    starts.sort_by_key(|(_, offset)| *offset);

    let mut consumed = 0;
    for (name, open) in starts {
        if open < consumed {
            continue;
        }
        let Some(close) = masked.closing(open, b'{', b'}') else {
            continue;
        };
        consumed = close;
        models.push(DataModel {
            fields: struct_fields(masked, open, close),
            name,
        });
    }
}

fn struct_fields(masked: &Masked, open: usize, close: usize) -> Vec<String> {
    let mut fields = Vec::new();
    for (_, decl) in masked.split_top_level(open, close, |b| b == b'\n' || b == b';') {
        // Tags are the trailing string literal; their contents are already blanked.
        let decl = decl
            .find(['"', '`'])
            .map_or(decl, |tag| &decl[..tag])
            .trim();
        if decl.is_empty() {
            continue;
        }
        match named_field().captures(decl) {
            Some(caps) => {
                let ty = normalize_type(caps.get(2).map_or("", |m| m.as_str()));
                let names = caps.get(1).map_or("", |m| m.as_str());
                fields.extend(names.split(',').map(|n| format!("{} {ty}", n.trim())));
            }
            None => fields.push(normalize_type(decl)),
        }
    }
    fields
}

fn normalize_type(ty: &str) -> String {
    ty.split_whitespace().collect::<Vec<_>>().join(" ")
}
