use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result, bail};

use super::model::{Channel, Loop, ScanSet, Table};
use crate::config::MarkerConfig;
use crate::error::{AnalysisError, AnalysisResult};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a scan set from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.txt` / `.dat` – instrument export made of `<line>` blocks
/// * `.json`         – `{ "rotation": [[[x...], [y...]], ...], "ellipticity": [...] }`
/// * `.csv`          – single loop, columns `Position, Measurement1, Measurement2`
pub fn load_file(path: &Path, markers: &MarkerConfig) -> Result<ScanSet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let set = match ext.as_str() {
        "txt" | "dat" => load_scan(path, markers)?,
        "json" => load_scan_set_json(path)?,
        "csv" => load_scan_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    if set.is_empty() {
        return Err(AnalysisError::Empty(path.to_path_buf()).into());
    }
    log::info!(
        "Loaded {} rotation and {} ellipticity loops from {}",
        set.rotation.len(),
        set.ellipticity.len(),
        path.display()
    );
    Ok(set)
}

// ---------------------------------------------------------------------------
// Fixed-column tables
// ---------------------------------------------------------------------------

/// Read a delimited numeric file into a [`Table`].
pub fn load_table(path: &Path) -> Result<Table> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let table = parse_table(&text).with_context(|| format!("parsing {}", path.display()))?;
    if table.is_empty() {
        return Err(AnalysisError::Empty(path.to_path_buf()).into());
    }
    Ok(table)
}

/// Parse whitespace-, comma-, semicolon- or tab-separated numeric columns.
///
/// Blank lines and `#` comments are skipped. The first data line may be a
/// header if none of its tokens is numeric. The column count is fixed by
/// the first numeric row; every later row must match it.
pub fn parse_table(text: &str) -> AnalysisResult<Table> {
    let mut table: Option<Table> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = split_fields(line).collect();
        if table.is_none() && tokens.iter().all(|t| t.parse::<f64>().is_err()) {
            log::debug!("Line {line_no}: treating '{line}' as header");
            continue;
        }

        let row = tokens
            .iter()
            .enumerate()
            .map(|(col, tok)| {
                tok.parse::<f64>().map_err(|_| {
                    AnalysisError::parse(line_no, format!("column {}: '{tok}' is not a number", col + 1))
                })
            })
            .collect::<AnalysisResult<Vec<f64>>>()?;

        table
            .get_or_insert_with(|| Table::new(row.len()))
            .push_row(row, line_no)?;
    }

    Ok(table.unwrap_or_else(|| Table::new(0)))
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Instrument scan export
// ---------------------------------------------------------------------------

/// Load the acquisition software's text export.
pub fn load_scan(path: &Path, markers: &MarkerConfig) -> Result<ScanSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_scan(&text, markers).with_context(|| format!("parsing {}", path.display()))
}

/// Block under construction while walking the export line by line.
struct Block {
    start_line: usize,
    /// Everything that is not a data row; searched for channel markers.
    label: String,
    in_data: bool,
    field: Vec<f64>,
    signal: Vec<f64>,
}

impl Block {
    fn new(start_line: usize) -> Self {
        Self {
            start_line,
            label: String::new(),
            in_data: false,
            field: Vec::new(),
            signal: Vec::new(),
        }
    }
}

/// Parse `<line> ... <data>: ... </line>` blocks.
///
/// Layout of one block:
///
/// ```text
/// <line>
/// <title>: 克尔转角
/// <data>:
///  磁感应强度(mT)  电压(V)  角度(度)
///  -30.5   0.0123   0.4521
///  ...
/// </line>
/// ```
///
/// Column 1 is the field, column 3 the Kerr angle. The channel is taken from
/// the first marker keyword found in the block's non-data text.
pub fn parse_scan(text: &str, markers: &MarkerConfig) -> AnalysisResult<ScanSet> {
    let mut set = ScanSet::default();
    let mut current: Option<Block> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let mut line = raw.trim();

        if let Some(rest) = line.strip_prefix("<line>") {
            if let Some(open) = current.take() {
                log::warn!("Block at line {} is not terminated", open.start_line);
                finish_block(open, markers, &mut set);
            }
            let mut block = Block::new(line_no);
            block.label.push_str(rest);
            current = Some(block);
            continue;
        }
        if line.starts_with("</line>") {
            if let Some(block) = current.take() {
                finish_block(block, markers, &mut set);
            }
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };

        if let Some(rest) = line.strip_prefix("<data>:") {
            block.in_data = true;
            line = rest.trim();
        }
        if line.is_empty() {
            continue;
        }
        if !block.in_data {
            block.label.push('\n');
            block.label.push_str(line);
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens[0].parse::<f64>().is_err() {
            // Column header row inside <data>.
            block.label.push('\n');
            block.label.push_str(line);
            continue;
        }
        if tokens.len() < 3 {
            return Err(AnalysisError::ColumnMismatch {
                line: line_no,
                expected: 3,
                found: tokens.len(),
            });
        }
        let field = parse_token(tokens[0], line_no, 1)?;
        let signal = parse_token(tokens[2], line_no, 3)?;
        block.field.push(field);
        block.signal.push(signal);
    }

    if let Some(open) = current.take() {
        log::warn!("Block at line {} is not terminated", open.start_line);
        finish_block(open, markers, &mut set);
    }

    if set.rotation.len() != set.ellipticity.len() {
        log::warn!(
            "Unequal channel counts: {} rotation vs {} ellipticity loops",
            set.rotation.len(),
            set.ellipticity.len()
        );
    }
    Ok(set)
}

fn parse_token(tok: &str, line: usize, col: usize) -> AnalysisResult<f64> {
    tok.parse::<f64>()
        .map_err(|_| AnalysisError::parse(line, format!("column {col}: '{tok}' is not a number")))
}

fn finish_block(block: Block, markers: &MarkerConfig, set: &mut ScanSet) {
    if block.field.is_empty() {
        log::warn!("Block at line {} has no data, skipped", block.start_line);
        return;
    }
    let Some(channel) = classify(&block.label, markers) else {
        log::warn!(
            "Block at line {} matches no channel marker, skipped",
            block.start_line
        );
        return;
    };
    log::debug!(
        "Block at line {}: {channel}, {} points",
        block.start_line,
        block.field.len()
    );
    set.channel_mut(channel).push(Loop {
        field: block.field,
        signal: block.signal,
    });
}

fn classify(label: &str, markers: &MarkerConfig) -> Option<Channel> {
    let label = label.to_lowercase();
    let hit = |keys: &[String]| keys.iter().any(|k| label.contains(&k.to_lowercase()));
    if hit(&markers.rotation) {
        Some(Channel::Rotation)
    } else if hit(&markers.ellipticity) {
        Some(Channel::Ellipticity)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row, then `Position, Measurement1, Measurement2`.
/// The first and third columns form one rotation loop.
pub fn load_scan_csv(path: &Path) -> Result<ScanSet> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let n_headers = reader.headers().context("reading CSV headers")?.len();
    if n_headers < 3 {
        bail!("CSV needs at least 3 columns, found {n_headers}");
    }

    let mut field = Vec::new();
    let mut signal = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let get = |col: usize| -> Result<f64> {
            let raw = record.get(col).unwrap_or("").trim();
            raw.parse::<f64>()
                .with_context(|| format!("CSV row {row_no}, column {}: '{raw}' is not a number", col + 1))
        };
        field.push(get(0)?);
        signal.push(get(2)?);
    }

    Ok(ScanSet {
        rotation: vec![Loop::new(field, signal)?],
        ellipticity: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// JSON interchange
// ---------------------------------------------------------------------------

pub fn load_scan_set_json(path: &Path) -> Result<ScanSet> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let set: ScanSet = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(set)
}

pub fn save_scan_set_json(path: &Path, set: &ScanSet) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), set)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Manual calibration points
// ---------------------------------------------------------------------------

/// `(polarizer angle in arc-minutes, detector signal)` pairs.
pub fn parse_calibration_points(text: &str) -> AnalysisResult<Vec<(f64, f64)>> {
    let table = parse_table(text)?;
    if table.n_cols() < 2 {
        return Err(AnalysisError::invalid(format!(
            "calibration data needs 2 columns, found {}",
            table.n_cols()
        )));
    }
    Ok(table.rows().iter().map(|r| (r[0], r[1])).collect())
}

pub fn load_calibration_points(path: &Path) -> Result<Vec<(f64, f64)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let points =
        parse_calibration_points(&text).with_context(|| format!("parsing {}", path.display()))?;
    if points.is_empty() {
        return Err(AnalysisError::Empty(path.to_path_buf()).into());
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN: &str = "\
<line>
<title>: 克尔转角
<data>:
 磁感应强度(mT)  电压(V)  角度(度)
 -10.0  0.1  -0.50
 0.0    0.1   0.00
 10.0   0.1   0.50
</line>
<line>
<title>: 克尔椭率
<data>:
 -10.0  0.2  -0.25
 10.0   0.2   0.25
</line>
";

    #[test]
    fn table_has_exact_shape_and_values() {
        let text = "# angle voltage\n0.5, 1.25\n1.0;2.5\n\n1.5\t-3.75\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.n_cols(), 2);
        assert_eq!(table.rows()[2], vec![1.5, -3.75]);
        assert_eq!(table.column(0), Some(vec![0.5, 1.0, 1.5]));
    }

    #[test]
    fn table_skips_leading_header() {
        let table = parse_table("angle voltage\n1 2\n3 4\n").unwrap();
        assert_eq!(table.n_rows(), 2);
    }

    #[test]
    fn table_rejects_non_numeric_value() {
        let err = parse_table("1 2\n3 x\n").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { line: 2, .. }));
    }

    #[test]
    fn table_rejects_column_count_change() {
        let err = parse_table("1 2\n3 4 5\n").unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ColumnMismatch {
                line: 2,
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn scan_blocks_split_by_channel() {
        let set = parse_scan(SCAN, &MarkerConfig::default()).unwrap();
        assert_eq!(set.rotation.len(), 1);
        assert_eq!(set.ellipticity.len(), 1);
        assert_eq!(set.rotation[0].field, vec![-10.0, 0.0, 10.0]);
        assert_eq!(set.rotation[0].signal, vec![-0.5, 0.0, 0.5]);
        assert_eq!(set.ellipticity[0].signal, vec![-0.25, 0.25]);
    }

    #[test]
    fn scan_skips_unknown_and_empty_blocks() {
        let text = "<line>\n<title>: other\n<data>:\n1 2 3\n</line>\n<line>\nrotation\n<data>:\n</line>\n";
        let set = parse_scan(text, &MarkerConfig::default()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn scan_short_row_is_an_error() {
        let text = "<line>\nrotation\n<data>:\n1 2\n</line>\n";
        let err = parse_scan(text, &MarkerConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::ColumnMismatch { line: 4, .. }));
    }

    #[test]
    fn json_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment_data.json");
        let set = parse_scan(SCAN, &MarkerConfig::default()).unwrap();
        save_scan_set_json(&path, &set).unwrap();
        let back = load_file(&path, &MarkerConfig::default()).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn csv_uses_first_and_third_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.csv");
        std::fs::write(
            &path,
            "Position,Measurement1,Measurement2\n-5,0.1,-0.2\n5,0.1,0.2\n",
        )
        .unwrap();
        let set = load_file(&path, &MarkerConfig::default()).unwrap();
        assert_eq!(set.rotation[0].field, vec![-5.0, 5.0]);
        assert_eq!(set.rotation[0].signal, vec![-0.2, 0.2]);
    }

    #[test]
    fn unsupported_extension_fails() {
        let err = load_file(Path::new("scan.parquet"), &MarkerConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }

    #[test]
    fn calibration_points_take_first_two_columns() {
        let points = parse_calibration_points("# min signal\n-30 -0.52\n0 0.01\n30 0.55\n").unwrap();
        assert_eq!(points, vec![(-30.0, -0.52), (0.0, 0.01), (30.0, 0.55)]);
    }
}
