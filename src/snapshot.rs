use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::aggregate::AggregateMap;

pub fn snapshot_path(dir: &Path, grouping_key: &str) -> PathBuf {
    dir.join(format!("{}.json", file_stem(grouping_key)))
}

pub fn write_snapshot<R: Serialize>(
    dir: &Path,
    grouping_key: &str,
    map: &AggregateMap<R>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create snapshot dir {}", dir.display()))?;
    let path = snapshot_path(dir, grouping_key);
    let json = serde_json::to_string(map).context("serialize snapshot")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write snapshot {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("swap snapshot {}", path.display()))?;
    info!(
        grouping = grouping_key,
        entities = map.entity_count(),
        records = map.record_count(),
        path = %path.display(),
        "snapshot written"
    );
    Ok(path)
}

pub fn read_snapshot<R: DeserializeOwned>(path: &Path) -> Result<AggregateMap<R>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid snapshot {}", path.display()))
}

fn file_stem(grouping_key: &str) -> String {
    let stem = grouping_key
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '-'
            }
        })
        .collect::<String>();
    let stem = stem.trim_matches(['-', '.']);
    if stem.is_empty() {
        "grouping".to_string()
    } else {
        stem.to_string()
    }
}
