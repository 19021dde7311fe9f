//! Persisted-state file formats, spec §6.
//!
//! Every writer here is a flat, line-oriented text format — one value (or
//! one space-separated record) per line — matching the plain-text
//! conventions `original_source` uses for its own `.part` output, rather
//! than reaching for a structured format nothing downstream reads.

use crate::util::{PartIndex, TechIndex};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// `<netlist>.cpart.<P>` / `<prefix>.chipletpart.parts.<P>`: one line per
/// vertex, integer partition index.
pub fn write_partition(path: &Path, partition: &[PartIndex]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for &p in partition {
        writeln!(writer, "{p}")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_partition(path: &Path) -> Result<Vec<PartIndex>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut partition = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        partition.push(line.parse::<PartIndex>().with_context(|| format!("invalid partition index: {line}"))?);
    }
    Ok(partition)
}

/// `<prefix>.chipletpart.techs.<P>`: one line per partition, tech node
/// identifier (name, not index — names survive a tech library re-ordering).
pub fn write_tech_assignment(path: &Path, tech_library_names: &[String], tech_per_part: &[TechIndex]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for &t in tech_per_part {
        let name = tech_library_names
            .get(t)
            .with_context(|| format!("tech index {t} out of range for a library of {}", tech_library_names.len()))?;
        writeln!(writer, "{name}")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_tech_assignment(path: &Path, tech_library_names: &[String]) -> Result<Vec<TechIndex>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut tech_per_part = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        let index = tech_library_names
            .iter()
            .position(|n| n == name)
            .with_context(|| format!("unknown tech node name: {name}"))?;
        tech_per_part.push(index);
    }
    Ok(tech_per_part)
}

/// `output.map`: `"<1-based index> <block name>"` per line, written
/// unconditionally after ingestion for diagnostics.
pub fn write_block_map(path: &Path, block_names: &[String]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for (i, name) in block_names.iter().enumerate() {
        writeln!(writer, "{} {}", i + 1, name)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_block_map(path: &Path) -> Result<Vec<(usize, String)>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (index_str, name) = line
            .split_once(' ')
            .with_context(|| format!("malformed output.map line: {line}"))?;
        let index = index_str.parse::<usize>().with_context(|| format!("invalid 1-based index: {index_str}"))?;
        rows.push((index, name.to_string()));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path(label: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        path.push(format!("chipletpart-persist-test-{}-{}-{}", std::process::id(), label, n));
        path
    }

    #[test]
    fn partition_round_trips() {
        let path = temp_path("parts");
        write_partition(&path, &[0, 1, 1, 2]).unwrap();
        let back = read_partition(&path).unwrap();
        assert_eq!(back, vec![0, 1, 1, 2]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn tech_assignment_round_trips_by_name() {
        let path = temp_path("techs");
        let names = vec!["7nm".to_string(), "14nm".to_string()];
        write_tech_assignment(&path, &names, &[1, 0, 1]).unwrap();
        let back = read_tech_assignment(&path, &names).unwrap();
        assert_eq!(back, vec![1, 0, 1]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn tech_assignment_rejects_unknown_name() {
        let path = temp_path("techs-bad");
        std::fs::write(&path, "ghost\n").unwrap();
        let names = vec!["7nm".to_string()];
        assert!(read_tech_assignment(&path, &names).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn block_map_round_trips_one_based() {
        let path = temp_path("map");
        write_block_map(&path, &["cpu0".to_string(), "mem0".to_string()]).unwrap();
        let back = read_block_map(&path).unwrap();
        assert_eq!(back, vec![(1, "cpu0".to_string()), (2, "mem0".to_string())]);
        std::fs::remove_file(&path).unwrap();
    }
}
