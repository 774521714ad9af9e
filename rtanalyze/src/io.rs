use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use rtcore::data::compound::Compound;

/// Column positions resolved from a case-insensitive header row.
struct Columns {
    name: usize,
    rt: usize,
    log_p: usize,
    anchor: usize,
    volume: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        let find = |aliases: &[&str]| lowered.iter().position(|h| aliases.contains(&h.as_str()));

        Ok(Columns {
            name: find(&["name"]).context("CSV missing 'name' column")?,
            rt: find(&["rt"]).context("CSV missing 'rt' column")?,
            log_p: find(&["log_p", "logp"]).context("CSV missing 'log_p' column")?,
            anchor: find(&["anchor", "is_anchor"]).context("CSV missing 'anchor' column")?,
            volume: find(&["volume"]),
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "1" => Some(true),
        "false" | "f" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_number(record: &csv::StringRecord, index: usize, row: usize, column: &str) -> Result<f64> {
    let raw = record.get(index).unwrap_or("").trim();
    raw.parse::<f64>()
        .with_context(|| format!("row {row}, {column}: '{raw}' is not a number"))
}

/// Read compounds from CSV text with a header row.
///
/// Required columns are `name`, `rt`, `log_p` (or `logp`) and `anchor` (or
/// `is_anchor`); `volume` is optional and may be left blank per row. Row
/// numbers in errors count data rows from 1.
pub fn read_compounds<R: Read>(reader: R) -> Result<Vec<Compound>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let columns = Columns::resolve(&headers)?;

    let mut compounds = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = i + 1;
        let record = result.with_context(|| format!("CSV row {row}"))?;

        let name = record.get(columns.name).unwrap_or("").to_string();
        if name.is_empty() {
            bail!("row {row}: empty compound name");
        }
        let rt = parse_number(&record, columns.rt, row, "rt")?;
        let log_p = parse_number(&record, columns.log_p, row, "log_p")?;
        let flag = record.get(columns.anchor).unwrap_or("");
        let is_anchor = match parse_flag(flag) {
            Some(value) => value,
            None => bail!("row {row}, anchor: '{flag}' is not a boolean"),
        };

        let mut compound = Compound::new(name, rt, log_p, is_anchor);
        if let Some(index) = columns.volume {
            if !record.get(index).unwrap_or("").is_empty() {
                compound = compound.with_volume(parse_number(&record, index, row, "volume")?);
            }
        }
        compounds.push(compound);
    }
    Ok(compounds)
}

pub fn load_compounds(path: &Path) -> Result<Vec<Compound>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_compounds(BufReader::new(file)).with_context(|| format!("reading {}", path.display()))
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))
}

/// Write `value` as pretty JSON to `output`, or to stdout when no path is given.
pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value).context("serializing report")?;
            writer.flush().with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value).context("serializing report")?;
            writeln!(handle).context("writing report to stdout")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_compounds() {
        let text = "Name,RT,logP,Anchor,Volume\n\
                    GD1a(36:1;O2),9.5,1.2,true,1.5e6\n\
                    GM3(36:1;O2), 12.1 ,3.4,F,\n";
        let compounds = read_compounds(text.as_bytes()).unwrap();
        assert_eq!(compounds.len(), 2);
        assert_eq!(compounds[0].name, "GD1a(36:1;O2)");
        assert!(compounds[0].is_anchor);
        assert_eq!(compounds[0].volume, Some(1.5e6));
        assert!((compounds[1].rt - 12.1).abs() < 1e-12);
        assert!(!compounds[1].is_anchor);
        assert_eq!(compounds[1].volume, None);
    }

    #[test]
    fn test_anchor_aliases() {
        let text = "name,rt,log_p,is_anchor\nA,1,1,yes\nB,2,2,0\nC,3,3,1\n";
        let flags: Vec<bool> = read_compounds(text.as_bytes())
            .unwrap()
            .iter()
            .map(|c| c.is_anchor)
            .collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_bad_number_names_row() {
        let text = "name,rt,log_p,anchor\nA,1.0,2.0,true\nB,abc,2.0,true\n";
        let err = read_compounds(text.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("row 2"));
    }

    #[test]
    fn test_missing_column() {
        let text = "name,rt,anchor\nA,1.0,true\n";
        let err = read_compounds(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("log_p"));
    }

    #[test]
    fn test_bad_flag() {
        let text = "name,rt,log_p,anchor\nA,1.0,2.0,maybe\n";
        assert!(read_compounds(text.as_bytes()).is_err());
    }
}
