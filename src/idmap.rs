use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::PubtatorError;
use crate::fs_util::{open_input, read_json, write_atomic};
use crate::output::to_pretty_json;

pub const DEFAULT_PREFIX: &str = "NCBIGENE";

/// Source id to `(type, target)` pairs, in file order.
pub type IdMapping = HashMap<String, Vec<(String, String)>>;

/// Read a TAB-separated `SOURCE\tTYPE\tTARGET` mapping table.
pub fn read_mapping(path: &Path) -> Result<IdMapping, PubtatorError> {
    let reader = open_input(path)?;
    let name = path.display().to_string();
    let mut mapping = IdMapping::new();
    let mut read = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| PubtatorError::Filesystem(format!("read {name}: {err}")))?;
        let fields = line.split('\t').collect::<Vec<_>>();
        let [source, kind, target] = fields[..] else {
            return Err(PubtatorError::MappingFormat {
                path: name,
                line: index + 1,
                fields: fields.len(),
                content: line.clone(),
            });
        };
        let targets = mapping.entry(source.to_string()).or_default();
        let pair = (kind.to_string(), target.to_string());
        if !targets.contains(&pair) {
            targets.push(pair);
        }
        read += 1;
    }
    tracing::info!("Read {read} from {name}");
    Ok(mapping)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub mapped: usize,
    pub missing: usize,
    pub multiple: usize,
}

impl fmt::Display for MappingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mapped {}, missing {}, multiple {}",
            self.mapped, self.missing, self.multiple
        )
    }
}

pub struct IdMapper {
    mapping: IdMapping,
    prefix: Option<String>,
    stats: MappingStats,
}

impl IdMapper {
    /// `prefix` limits mapping to ids starting with it; `None` or an empty
    /// prefix maps every id.
    pub fn new(mapping: IdMapping, prefix: Option<String>) -> Self {
        Self {
            mapping,
            prefix: prefix.filter(|prefix| !prefix.is_empty()),
            stats: MappingStats::default(),
        }
    }

    pub fn stats(&self) -> MappingStats {
        self.stats
    }

    pub fn map_id(&mut self, id: &str) -> Option<String> {
        if let Some(prefix) = &self.prefix
            && !id.starts_with(prefix.as_str())
        {
            return None;
        }
        let Some(targets) = self.mapping.get(id) else {
            self.stats.missing += 1;
            return None;
        };
        let (_, first) = targets.first()?;
        if targets.len() > 1 {
            self.stats.multiple += 1;
            let all = targets
                .iter()
                .map(|(_, target)| target.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!("{id} maps to multiple, arbitrarily using first: {all}");
        }
        self.stats.mapped += 1;
        Some(first.clone())
    }

    /// Rewrite every `"id"` string of every object in `data`.
    pub fn map_ids(&mut self, data: &mut Value) {
        match data {
            Value::Array(items) => {
                for item in items {
                    self.map_ids(item);
                }
            }
            Value::Object(object) => {
                let mapped = match object.get("id") {
                    Some(Value::String(id)) => self.map_id(id),
                    _ => None,
                };
                if let Some(mapped) = mapped {
                    object.insert("id".to_string(), Value::String(mapped));
                }
                for value in object.values_mut() {
                    if value.is_array() || value.is_object() {
                        self.map_ids(value);
                    }
                }
            }
            _ => {}
        }
    }

    /// Rewrite the ids of a JSON file in place.
    pub fn map_file_ids(&mut self, path: &Path) -> Result<(), PubtatorError> {
        let mut data = read_json(path)?;
        self.map_ids(&mut data);
        let content = to_pretty_json(&data).map_err(|err| PubtatorError::Json {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        write_atomic(path, content.as_bytes())
    }
}
