//! XML ingestion for the six library files and the netlist/blocks files.
//!
//! Grammar here is this crate's own invention (the real grammars are a
//! non-goal, spec §1) but stable: one top-level element wrapping a flat list
//! of leaf elements, attributes only, matching the shape
//! `ReadDesignFromFile`/`ConstructChip` in the original source expect (one
//! row per named process, keyed by a tech identifier). Parsed with
//! `quick-xml`'s event reader rather than its `serde` feature, since the
//! per-file attribute sets are small and heterogeneous enough that a direct
//! event walk reads more plainly than a derive.

use crate::cost_model::{TechLibrary, TechNode};
use crate::hypergraph::Hypergraph;
use crate::util::WeightVec;
use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

/// one row parsed from a blocks XML file
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub name: String,
    pub area: f32,
    pub power: f32,
    pub is_memory: bool,
}

/// one row parsed from a netlist XML file
#[derive(Debug, Clone)]
pub struct NetRecord {
    pub blocks: Vec<String>,
    pub bandwidth: f32,
    pub reach: f32,
    pub io_area: f32,
    pub bidirectional: bool,
}

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn attr_string(tag: &quick_xml::events::BytesStart, key: &str) -> Option<String> {
    tag.attributes().flatten().find(|a| a.key.as_ref() == key.as_bytes()).map(|a| {
        String::from_utf8_lossy(&a.value).into_owned()
    })
}

fn attr_f32(tag: &quick_xml::events::BytesStart, key: &str, default: f32) -> Result<f32> {
    match attr_string(tag, key) {
        Some(v) => v.parse::<f32>().with_context(|| format!("attribute {key} is not a number: {v}")),
        None => Ok(default),
    }
}

fn attr_bool(tag: &quick_xml::events::BytesStart, key: &str, default: bool) -> bool {
    attr_string(tag, key).map(|v| v == "true" || v == "1").unwrap_or(default)
}

/// walk every direct child of the document root, calling `visit` with its
/// local tag name and a borrowed `BytesStart` for attribute access; used by
/// the tech-library and blocks files, which are flat:
/// `<root><leaf attr="..."/>...</root>`
fn for_each_flat_leaf(xml: &str, mut visit: impl FnMut(&str, &quick_xml::events::BytesStart)) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    loop {
        match reader.read_event().context("malformed xml")? {
            Event::Start(tag) => {
                depth += 1;
                if depth == 2 {
                    let name = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
                    visit(&name, &tag);
                }
            }
            Event::Empty(tag) if depth == 1 => {
                let name = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
                visit(&name, &tag);
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

macro_rules! tech_reader {
    ($fn_name:ident, $field:ident, $unit:expr) => {
        pub fn $fn_name(path: &Path) -> Result<Vec<(String, f32)>> {
            let xml = read_to_string(path)?;
            let mut rows = Vec::new();
            for_each_flat_leaf(&xml, |_tag, attrs| {
                if let Some(name) = attr_string(attrs, "name") {
                    let value = attr_f32(attrs, $unit, 0.0).unwrap_or(0.0);
                    rows.push((name, value));
                }
            })?;
            Ok(rows)
        }
    };
}

tech_reader!(read_wafer_costs, wafer_cost_per_area, "cost_per_area");
tech_reader!(read_io_costs, io_cost_per_net, "cost_per_net");
tech_reader!(read_assembly_costs, assembly_cost_per_chiplet, "cost_per_chiplet");
tech_reader!(read_test_costs, test_cost_per_area, "cost_per_area");

/// `<layers><layer name="7nm" count="10"/>...</layers>`
pub fn read_layer_counts(path: &Path) -> Result<HashMap<String, u32>> {
    let xml = read_to_string(path)?;
    let mut counts = HashMap::new();
    for_each_flat_leaf(&xml, |_tag, attrs| {
        if let Some(name) = attr_string(attrs, "name") {
            let count = attr_string(attrs, "count").and_then(|v| v.parse::<u32>().ok()).unwrap_or(1);
            counts.insert(name, count);
        }
    })?;
    Ok(counts)
}

/// merge the five per-file tech tables into one [`TechLibrary`], keyed by
/// tech identifier; a tech present in one file but absent from another falls
/// back to a zero contribution for the missing field
pub fn read_tech_library(
    io_path: &Path,
    layer_path: &Path,
    wafer_path: &Path,
    assembly_path: &Path,
    test_path: &Path,
) -> Result<TechLibrary> {
    let wafer = read_wafer_costs(wafer_path)?;
    let io = read_io_costs(io_path)?;
    let assembly = read_assembly_costs(assembly_path)?;
    let test = read_test_costs(test_path)?;
    let _layers = read_layer_counts(layer_path)?; // layer count is informational only for the default cost oracle

    let mut by_name: HashMap<String, TechNode> = HashMap::new();
    let order: Vec<String> = wafer.iter().map(|(n, _)| n.clone()).collect();
    for (name, cost) in &wafer {
        by_name.entry(name.clone()).or_insert_with(|| TechNode {
            name: name.clone(),
            wafer_cost_per_area: 0.0,
            io_cost_per_net: 0.0,
            assembly_cost_per_chiplet: 0.0,
            test_cost_per_area: 0.0,
        }).wafer_cost_per_area = *cost;
    }
    for (name, cost) in &io {
        by_name.entry(name.clone()).or_insert_with(|| TechNode {
            name: name.clone(),
            wafer_cost_per_area: 0.0,
            io_cost_per_net: 0.0,
            assembly_cost_per_chiplet: 0.0,
            test_cost_per_area: 0.0,
        }).io_cost_per_net = *cost;
    }
    for (name, cost) in &assembly {
        by_name.entry(name.clone()).or_insert_with(|| TechNode {
            name: name.clone(),
            wafer_cost_per_area: 0.0,
            io_cost_per_net: 0.0,
            assembly_cost_per_chiplet: 0.0,
            test_cost_per_area: 0.0,
        }).assembly_cost_per_chiplet = *cost;
    }
    for (name, cost) in &test {
        by_name.entry(name.clone()).or_insert_with(|| TechNode {
            name: name.clone(),
            wafer_cost_per_area: 0.0,
            io_cost_per_net: 0.0,
            assembly_cost_per_chiplet: 0.0,
            test_cost_per_area: 0.0,
        }).test_cost_per_area = *cost;
    }

    if by_name.is_empty() {
        bail!("tech library files contained no named process entries");
    }
    // preserve the wafer file's declaration order where possible, then any
    // tech that only appeared in a different file
    let mut nodes = Vec::with_capacity(by_name.len());
    for name in &order {
        if let Some(node) = by_name.remove(name) {
            nodes.push(node);
        }
    }
    let mut rest: Vec<TechNode> = by_name.into_values().collect();
    rest.sort_by(|a, b| a.name.cmp(&b.name));
    nodes.extend(rest);
    Ok(TechLibrary { nodes })
}

/// `<blocks><block name="cpu0" area="100.0" power="5.0" memory="false"/>...</blocks>`
pub fn read_blocks(path: &Path) -> Result<Vec<BlockRecord>> {
    let xml = read_to_string(path)?;
    let mut blocks = Vec::new();
    for_each_flat_leaf(&xml, |_tag, attrs| {
        if let Some(name) = attr_string(attrs, "name") {
            blocks.push(BlockRecord {
                name,
                area: attr_f32(attrs, "area", 0.0).unwrap_or(0.0),
                power: attr_f32(attrs, "power", 0.0).unwrap_or(0.0),
                is_memory: attr_bool(attrs, "memory", false),
            });
        }
    })?;
    if blocks.is_empty() {
        bail!("blocks file {} contained no blocks", path.display());
    }
    Ok(blocks)
}

/// `<nets><net bandwidth="1.0" reach="500.0" io_area="1.0" bidirectional="true"><pin block="a"/><pin block="b"/></net>...</nets>`
pub fn read_netlist(path: &Path) -> Result<Vec<NetRecord>> {
    let xml = read_to_string(path)?;
    let mut reader = Reader::from_str(&xml);
    let mut nets = Vec::new();
    let mut current: Option<NetRecord> = None;
    loop {
        match reader.read_event().context("malformed netlist xml")? {
            Event::Start(tag) if tag.local_name().as_ref() == b"net" => {
                current = Some(NetRecord {
                    blocks: Vec::new(),
                    bandwidth: attr_f32(&tag, "bandwidth", 1.0).unwrap_or(1.0),
                    reach: attr_f32(&tag, "reach", f32::MAX).unwrap_or(f32::MAX),
                    io_area: attr_f32(&tag, "io_area", 0.0).unwrap_or(0.0),
                    bidirectional: attr_bool(&tag, "bidirectional", true),
                });
            }
            Event::Empty(tag) if tag.local_name().as_ref() == b"pin" => {
                if let (Some(net), Some(block)) = (current.as_mut(), attr_string(&tag, "block")) {
                    net.blocks.push(block);
                }
            }
            Event::End(tag) if tag.local_name().as_ref() == b"net" => {
                if let Some(net) = current.take() {
                    nets.push(net);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if nets.is_empty() {
        bail!("netlist file {} contained no nets", path.display());
    }
    Ok(nets)
}

/// assemble a [`Hypergraph`] from parsed blocks and nets; vertex weight
/// vector is `[area, power]`, edge weight vector is `[bandwidth]`. Blocks
/// referenced by a net but absent from the blocks file are a fatal
/// ingestion error (distinct from the core's own `IndexOutOfRange`, which
/// only fires on indices the core itself computes).
pub fn build_hypergraph(blocks: &[BlockRecord], nets: &[NetRecord]) -> Result<(Hypergraph, Vec<String>)> {
    let index_of: HashMap<&str, usize> = blocks.iter().enumerate().map(|(i, b)| (b.name.as_str(), i)).collect();
    let vertex_weights: Vec<WeightVec> = blocks.iter().map(|b| vec![b.area, b.power]).collect();

    let mut edges = Vec::with_capacity(nets.len());
    let mut edge_weights = Vec::with_capacity(nets.len());
    let mut reach = Vec::with_capacity(nets.len());
    let mut io_area = Vec::with_capacity(nets.len());
    for net in nets {
        let mut vertices = Vec::with_capacity(net.blocks.len());
        for name in &net.blocks {
            let &v = index_of.get(name.as_str()).with_context(|| format!("net references unknown block {name}"))?;
            if !vertices.contains(&v) {
                vertices.push(v);
            }
        }
        if vertices.is_empty() {
            bail!("net with no resolvable pins");
        }
        edges.push(vertices);
        edge_weights.push(vec![net.bandwidth]);
        reach.push(net.reach);
        io_area.push(net.io_area);
    }

    let hypergraph = Hypergraph::new(vertex_weights, edges, edge_weights, reach, io_area);
    let names = blocks.iter().map(|b| b.name.clone()).collect();
    Ok((hypergraph, names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile_path::TempPath {
        tempfile_path::TempPath::with_contents(contents)
    }

    // a tiny local stand-in for a temp-file helper, avoiding a dependency
    // the rest of the corpus does not otherwise need just for this test
    mod tempfile_path {
        use std::path::{Path, PathBuf};

        pub struct TempPath(PathBuf);
        impl TempPath {
            pub fn with_contents(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("chipletpart-ingest-test-{}-{}", std::process::id(), super::rand_suffix()));
                std::fs::write(&path, contents).unwrap();
                Self(path)
            }
            pub fn path(&self) -> &Path {
                &self.0
            }
        }
        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    #[test]
    fn reads_wafer_costs() {
        let f = write_temp(r#"<wafers><wafer name="7nm" cost_per_area="1.5"/><wafer name="14nm" cost_per_area="0.5"/></wafers>"#);
        let rows = read_wafer_costs(f.path()).unwrap();
        assert_eq!(rows, vec![("7nm".to_string(), 1.5), ("14nm".to_string(), 0.5)]);
    }

    #[test]
    fn reads_blocks_with_defaults() {
        let f = write_temp(r#"<blocks><block name="cpu0" area="100.0" power="5.0" memory="true"/><block name="mem0" area="50.0"/></blocks>"#);
        let blocks = read_blocks(f.path()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_memory);
        assert_eq!(blocks[1].power, 0.0);
    }

    #[test]
    fn reads_netlist_with_pins() {
        let f = write_temp(
            r#"<nets><net bandwidth="2.0" reach="500.0" io_area="1.0"><pin block="a"/><pin block="b"/></net></nets>"#,
        );
        let nets = read_netlist(f.path()).unwrap();
        assert_eq!(nets.len(), 1);
        assert_eq!(nets[0].blocks, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn builds_hypergraph_from_blocks_and_nets() {
        let blocks = vec![
            BlockRecord { name: "a".into(), area: 10.0, power: 1.0, is_memory: false },
            BlockRecord { name: "b".into(), area: 20.0, power: 2.0, is_memory: false },
        ];
        let nets = vec![NetRecord { blocks: vec!["a".into(), "b".into()], bandwidth: 1.0, reach: 100.0, io_area: 1.0, bidirectional: true }];
        let (hypergraph, names) = build_hypergraph(&blocks, &nets).unwrap();
        assert_eq!(hypergraph.num_vertices(), 2);
        assert_eq!(hypergraph.num_edges(), 1);
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn net_referencing_unknown_block_is_an_error() {
        let blocks = vec![BlockRecord { name: "a".into(), area: 1.0, power: 0.0, is_memory: false }];
        let nets = vec![NetRecord { blocks: vec!["a".into(), "ghost".into()], bandwidth: 1.0, reach: 1.0, io_area: 1.0, bidirectional: false }];
        assert!(build_hypergraph(&blocks, &nets).is_err());
    }
}
