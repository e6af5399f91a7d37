//! Read-only view of an Illumina run directory.
//!
//! The driver only needs the run's identity, its lanes, reads and tiles, and
//! where the per-tile auxiliary files live. [`RunDescriptor`] is that view;
//! [`IlluminaRunDir`] implements it from `RunInfo.xml`.

use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use serde::Deserialize;
use crate::config::defs::{BASECALLS_DIR, INTENSITIES_DIR, RUN_INFO_FILE};

/// One sequencing read: a contiguous range of cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDefinition {
    index: u32,
    first_cycle: u32,
    last_cycle: u32,
}

impl ReadDefinition {
    pub fn new(index: u32, first_cycle: u32, last_cycle: u32) -> Result<Self> {
        if first_cycle > last_cycle {
            return Err(anyhow!(
                "Read {}: first cycle {} is after last cycle {}",
                index, first_cycle, last_cycle
            ));
        }
        Ok(ReadDefinition { index, first_cycle, last_cycle })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn first_cycle(&self) -> u32 {
        self.first_cycle
    }

    pub fn last_cycle(&self) -> u32 {
        self.last_cycle
    }

    pub fn cycle_count(&self) -> u32 {
        self.last_cycle - self.first_cycle + 1
    }
}

pub trait RunDescriptor {
    fn instrument(&self) -> &str;
    fn run_id(&self) -> &str;
    fn lanes(&self) -> &[u32];
    fn reads(&self) -> &[ReadDefinition];
    fn tiles(&self) -> &[u32];
    fn base_calls_dir(&self) -> PathBuf;
    fn filter_path(&self, lane: u32, tile: u32) -> PathBuf;
    fn control_path(&self, lane: u32, tile: u32) -> PathBuf;
    fn positions_path(&self, lane: u32, tile: u32) -> PathBuf;
    /// Canonical Qseq file name for one tile of one read. Assumed unique per (lane, tile, read).
    fn qseq_name(&self, lane: u32, tile: u32, read: u32) -> String;
}


#[derive(Debug, Clone)]
pub struct IlluminaRunDir {
    root: PathBuf,
    instrument: String,
    run_id: String,
    lanes: Vec<u32>,
    reads: Vec<ReadDefinition>,
    tiles: Vec<u32>,
}

impl IlluminaRunDir {
    /// Opens a run directory by reading its `RunInfo.xml`.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("Run directory {} does not exist or is not a directory", root.display()));
        }
        let info_path = root.join(RUN_INFO_FILE);
        let text = std::fs::read_to_string(&info_path)
            .map_err(|e| anyhow!("Could not read {}: {}", info_path.display(), e))?;
        let mut run_dir = Self::from_run_info(&text)
            .map_err(|e| anyhow!("Could not parse {}: {}", info_path.display(), e))?;
        run_dir.root = root.to_path_buf();
        Ok(run_dir)
    }

    /// Builds the run description from `RunInfo.xml` text. Paths are relative
    /// until [`IlluminaRunDir::open`] sets the root.
    pub fn from_run_info(xml: &str) -> Result<Self> {
        let parsed: RunInfoXml = quick_xml::de::from_str(xml).map_err(|e| anyhow!("Malformed RunInfo XML: {e}"))?;
        let run = parsed.run;

        if run.reads.reads.is_empty() {
            return Err(anyhow!("RunInfo lists no reads"));
        }
        let mut reads = Vec::with_capacity(run.reads.reads.len());
        let mut next_cycle = 1u32;
        for read in &run.reads.reads {
            if read.num_cycles == 0 {
                return Err(anyhow!("Read {} has no cycles", read.number));
            }
            let last_cycle = next_cycle + read.num_cycles - 1;
            reads.push(ReadDefinition::new(read.number, next_cycle, last_cycle)?);
            next_cycle = last_cycle + 1;
        }

        let layout = &run.layout;
        if layout.lane_count == 0 {
            return Err(anyhow!("FlowcellLayout has no lanes"));
        }
        let lanes: Vec<u32> = (1..=layout.lane_count).collect();
        let tiles = match layout.tile_set.as_ref().and_then(|set| set.tiles.as_ref()) {
            Some(listed) if !listed.tiles.is_empty() => tiles_from_names(&listed.tiles, layout.lane_count)?,
            _ => tiles_from_layout(layout)?,
        };
        if tiles.is_empty() {
            return Err(anyhow!("FlowcellLayout describes no tiles"));
        }

        Ok(IlluminaRunDir {
            root: PathBuf::new(),
            instrument: run.instrument.trim().to_string(),
            run_id: run.number.to_string(),
            lanes,
            reads,
            tiles,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lane_dir(base: PathBuf, lane: u32) -> PathBuf {
        base.join(format!("L{:03}", lane))
    }
}

/// Tile codes as `surface * 1000 + swath * 100 + tile`, e.g. 1101..2316.
fn tiles_from_layout(layout: &FlowcellLayoutXml) -> Result<Vec<u32>> {
    // larger counts would give two tiles the same code
    if layout.swath_count > 9 || layout.tile_count > 99 {
        return Err(anyhow!(
            "FlowcellLayout with {} swaths of {} tiles can't be given four digit tile codes",
            layout.swath_count, layout.tile_count
        ));
    }
    let mut tiles = Vec::new();
    for surface in 1..=layout.surface_count {
        for swath in 1..=layout.swath_count {
            for tile in 1..=layout.tile_count {
                tiles.push(surface * 1000 + swath * 100 + tile);
            }
        }
    }
    Ok(tiles)
}

/// Explicit `<lane>_<tile>` tile names. Every lane must list the same tiles, in
/// the same order, since each lane is converted with the one tile list.
fn tiles_from_names(names: &[String], lane_count: u32) -> Result<Vec<u32>> {
    let mut per_lane: Vec<Vec<u32>> = vec![Vec::new(); lane_count as usize];
    for name in names {
        let name = name.trim();
        let (lane, tile) = name
            .split_once('_')
            .and_then(|(lane, tile)| Some((lane.parse::<u32>().ok()?, tile.parse::<u32>().ok()?)))
            .ok_or_else(|| anyhow!("Invalid tile name '{}'", name))?;
        if lane == 0 || lane > lane_count {
            return Err(anyhow!("Tile '{}' names lane {} but the flowcell has {} lanes", name, lane, lane_count));
        }
        let tiles = &mut per_lane[(lane - 1) as usize];
        if !tiles.contains(&tile) {
            tiles.push(tile);
        }
    }

    let mut lanes = per_lane.into_iter().enumerate();
    let (_, first) = lanes.next().ok_or_else(|| anyhow!("FlowcellLayout has no lanes"))?;
    for (idx, tiles) in lanes {
        if tiles != first {
            return Err(anyhow!(
                "Lane {} lists tiles {:?} but lane 1 lists {:?}; lanes with different tiles are not supported",
                idx + 1, tiles, first
            ));
        }
    }
    Ok(first)
}

impl RunDescriptor for IlluminaRunDir {
    fn instrument(&self) -> &str {
        &self.instrument
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn lanes(&self) -> &[u32] {
        &self.lanes
    }

    fn reads(&self) -> &[ReadDefinition] {
        &self.reads
    }

    fn tiles(&self) -> &[u32] {
        &self.tiles
    }

    fn base_calls_dir(&self) -> PathBuf {
        self.root.join(BASECALLS_DIR)
    }

    fn filter_path(&self, lane: u32, tile: u32) -> PathBuf {
        Self::lane_dir(self.base_calls_dir(), lane).join(format!("s_{}_{}.filter", lane, tile))
    }

    fn control_path(&self, lane: u32, tile: u32) -> PathBuf {
        Self::lane_dir(self.base_calls_dir(), lane).join(format!("s_{}_{}.control", lane, tile))
    }

    fn positions_path(&self, lane: u32, tile: u32) -> PathBuf {
        Self::lane_dir(self.root.join(INTENSITIES_DIR), lane).join(format!("s_{}_{}.clocs", lane, tile))
    }

    fn qseq_name(&self, lane: u32, tile: u32, read: u32) -> String {
        format!("s_{}_{}_{:04}_qseq.txt", lane, read, tile)
    }
}


#[derive(Debug, Deserialize)]
#[serde(rename = "RunInfo")]
struct RunInfoXml {
    #[serde(rename = "Run")]
    run: RunXml,
}

#[derive(Debug, Deserialize)]
struct RunXml {
    #[serde(rename = "@Number")]
    number: u32,
    #[serde(rename = "Instrument")]
    instrument: String,
    #[serde(rename = "Reads")]
    reads: ReadsXml,
    #[serde(rename = "FlowcellLayout")]
    layout: FlowcellLayoutXml,
}

#[derive(Debug, Deserialize)]
struct ReadsXml {
    #[serde(rename = "Read", default)]
    reads: Vec<ReadXml>,
}

#[derive(Debug, Deserialize)]
struct ReadXml {
    #[serde(rename = "@Number")]
    number: u32,
    #[serde(rename = "@NumCycles")]
    num_cycles: u32,
}

#[derive(Debug, Deserialize)]
struct FlowcellLayoutXml {
    #[serde(rename = "@LaneCount")]
    lane_count: u32,
    #[serde(rename = "@SurfaceCount")]
    surface_count: u32,
    #[serde(rename = "@SwathCount")]
    swath_count: u32,
    #[serde(rename = "@TileCount")]
    tile_count: u32,
    #[serde(rename = "TileSet")]
    tile_set: Option<TileSetXml>,
}

#[derive(Debug, Deserialize)]
struct TileSetXml {
    #[serde(rename = "Tiles")]
    tiles: Option<TilesXml>,
}

#[derive(Debug, Deserialize)]
struct TilesXml {
    #[serde(rename = "Tile", default)]
    tiles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RUN_INFO: &str = r#"<?xml version="1.0"?>
<RunInfo xmlns:xsd="http://www.w3.org/2001/XMLSchema" Version="2">
  <Run Id="110624_M00123_0042_000000000-A0ABC" Number="42">
    <Flowcell>000000000-A0ABC</Flowcell>
    <Instrument>M00123</Instrument>
    <Date>110624</Date>
    <Reads>
      <Read Number="1" NumCycles="101" IsIndexedRead="N" />
      <Read Number="2" NumCycles="7" IsIndexedRead="Y" />
      <Read Number="3" NumCycles="101" IsIndexedRead="N" />
    </Reads>
    <FlowcellLayout LaneCount="2" SurfaceCount="2" SwathCount="1" TileCount="3" />
  </Run>
</RunInfo>"#;

    #[test]
    fn test_read_definition() -> Result<()> {
        let read = ReadDefinition::new(1, 1, 100)?;
        assert_eq!(read.cycle_count(), 100);
        assert_eq!(ReadDefinition::new(2, 5, 5)?.cycle_count(), 1);
        assert!(ReadDefinition::new(3, 10, 9).is_err());
        Ok(())
    }

    #[test]
    fn test_run_info_parsing() -> Result<()> {
        let run = IlluminaRunDir::from_run_info(RUN_INFO)?;
        assert_eq!(run.instrument(), "M00123");
        assert_eq!(run.run_id(), "42");
        assert_eq!(run.lanes(), &[1, 2]);
        assert_eq!(
            run.reads(),
            &[
                ReadDefinition::new(1, 1, 101)?,
                ReadDefinition::new(2, 102, 108)?,
                ReadDefinition::new(3, 109, 209)?,
            ]
        );
        assert_eq!(run.tiles(), &[1101, 1102, 1103, 2101, 2102, 2103]);
        Ok(())
    }

    #[test]
    fn test_explicit_tile_list_wins() -> Result<()> {
        let xml = r#"<RunInfo Version="5">
  <Run Id="X" Number="7">
    <Instrument>NS500</Instrument>
    <Reads><Read Number="1" NumCycles="50" IsIndexedRead="N" /></Reads>
    <FlowcellLayout LaneCount="1" SurfaceCount="2" SwathCount="3" TileCount="12">
      <TileSet TileNamingConvention="FourDigit">
        <Tiles>
          <Tile>1_1101</Tile>
          <Tile>1_1102</Tile>
          <Tile>1_2101</Tile>
        </Tiles>
      </TileSet>
    </FlowcellLayout>
  </Run>
</RunInfo>"#;
        let run = IlluminaRunDir::from_run_info(xml)?;
        assert_eq!(run.tiles(), &[1101, 1102, 2101]);
        Ok(())
    }

    fn layout_run_info(layout: &str) -> String {
        format!(
            r#"<RunInfo Version="5">
  <Run Id="X" Number="7">
    <Instrument>NS500</Instrument>
    <Reads><Read Number="1" NumCycles="50" IsIndexedRead="N" /></Reads>
    {}
  </Run>
</RunInfo>"#,
            layout
        )
    }

    #[test]
    fn test_tile_lists_must_match_across_lanes() -> Result<()> {
        let same = layout_run_info(
            r#"<FlowcellLayout LaneCount="2" SurfaceCount="1" SwathCount="1" TileCount="2">
      <TileSet><Tiles><Tile>1_1101</Tile><Tile>2_1101</Tile><Tile>1_1102</Tile><Tile>2_1102</Tile></Tiles></TileSet>
    </FlowcellLayout>"#,
        );
        assert_eq!(IlluminaRunDir::from_run_info(&same)?.tiles(), &[1101, 1102]);

        // lane 2 has no tile 1102
        let uneven = layout_run_info(
            r#"<FlowcellLayout LaneCount="2" SurfaceCount="1" SwathCount="1" TileCount="2">
      <TileSet><Tiles><Tile>1_1101</Tile><Tile>1_1102</Tile><Tile>2_1101</Tile></Tiles></TileSet>
    </FlowcellLayout>"#,
        );
        let err = IlluminaRunDir::from_run_info(&uneven).unwrap_err().to_string();
        assert!(err.contains("Lane 2"), "{}", err);

        let unknown_lane = layout_run_info(
            r#"<FlowcellLayout LaneCount="1" SurfaceCount="1" SwathCount="1" TileCount="1">
      <TileSet><Tiles><Tile>1_1101</Tile><Tile>3_1101</Tile></Tiles></TileSet>
    </FlowcellLayout>"#,
        );
        assert!(IlluminaRunDir::from_run_info(&unknown_lane).is_err());

        let no_lane = layout_run_info(
            r#"<FlowcellLayout LaneCount="1" SurfaceCount="1" SwathCount="1" TileCount="1">
      <TileSet><Tiles><Tile>1101</Tile></Tiles></TileSet>
    </FlowcellLayout>"#,
        );
        assert!(IlluminaRunDir::from_run_info(&no_lane).is_err());
        Ok(())
    }

    #[test]
    fn test_layout_that_overflows_tile_codes_is_rejected() -> Result<()> {
        let largest = layout_run_info(r#"<FlowcellLayout LaneCount="1" SurfaceCount="2" SwathCount="9" TileCount="99" />"#);
        let run = IlluminaRunDir::from_run_info(&largest)?;
        assert_eq!(run.tiles().len(), 2 * 9 * 99);
        assert_eq!(run.tiles().last(), Some(&2999));

        let too_many_tiles = layout_run_info(r#"<FlowcellLayout LaneCount="1" SurfaceCount="1" SwathCount="2" TileCount="100" />"#);
        assert!(IlluminaRunDir::from_run_info(&too_many_tiles).is_err());
        let too_many_swaths = layout_run_info(r#"<FlowcellLayout LaneCount="1" SurfaceCount="1" SwathCount="10" TileCount="4" />"#);
        assert!(IlluminaRunDir::from_run_info(&too_many_swaths).is_err());
        Ok(())
    }

    #[test]
    fn test_run_info_without_reads_is_rejected() {
        let xml = r#"<RunInfo><Run Id="X" Number="1"><Instrument>I</Instrument><Reads></Reads>
<FlowcellLayout LaneCount="1" SurfaceCount="1" SwathCount="1" TileCount="1" /></Run></RunInfo>"#;
        assert!(IlluminaRunDir::from_run_info(xml).is_err());
    }

    #[test]
    fn test_open_and_paths() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join(RUN_INFO_FILE), RUN_INFO)?;
        let run = IlluminaRunDir::open(dir.path())?;

        assert_eq!(run.base_calls_dir(), dir.path().join("Data/Intensities/BaseCalls"));
        assert_eq!(
            run.filter_path(1, 1101),
            dir.path().join("Data/Intensities/BaseCalls/L001/s_1_1101.filter")
        );
        assert_eq!(
            run.control_path(2, 2103),
            dir.path().join("Data/Intensities/BaseCalls/L002/s_2_2103.control")
        );
        assert_eq!(
            run.positions_path(1, 1102),
            dir.path().join("Data/Intensities/L001/s_1_1102.clocs")
        );
        assert_eq!(run.qseq_name(1, 1101, 3), "s_1_3_1101_qseq.txt");
        assert_eq!(run.qseq_name(1, 11, 1), "s_1_1_0011_qseq.txt");
        Ok(())
    }

    #[test]
    fn test_open_missing_run_info() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(IlluminaRunDir::open(dir.path()).is_err());
        assert!(IlluminaRunDir::open(&dir.path().join("nope")).is_err());
        Ok(())
    }
}
