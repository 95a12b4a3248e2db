//! Plain text reading and writing of signals and peak tables.
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path;

use crate::peak::{MajorPeak, RefinedPeak};

/// A signal read from text, with the position of each point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalTable {
    /// The first column, or the row number when there is only one column
    pub mz_array: Vec<f64>,
    pub intensity_array: Vec<f64>,
}

impl SignalTable {
    pub fn len(&self) -> usize {
        self.intensity_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity_array.is_empty()
    }
}

fn invalid_data(line_number: usize, message: String) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line {line_number}: {message}"),
    )
}

fn parse_value(token: &str, line_number: usize) -> io::Result<f64> {
    token
        .parse::<f64>()
        .map_err(|e| invalid_data(line_number, format!("could not parse {token:?}: {e}")))
}

/// Read a signal with one intensity column, or m/z and intensity columns,
/// separated by whitespace. Blank lines and lines starting with `#` are skipped.
pub fn signal_from_reader<R: BufRead>(reader: R) -> io::Result<SignalTable> {
    let mut table = SignalTable::default();
    let mut width = None;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match *width.get_or_insert(tokens.len()) {
            w if w != tokens.len() => {
                return Err(invalid_data(
                    i + 1,
                    format!("expected {w} columns, found {}", tokens.len()),
                ))
            }
            1 => {
                table.mz_array.push(table.intensity_array.len() as f64);
                table.intensity_array.push(parse_value(tokens[0], i + 1)?);
            }
            2 => {
                table.mz_array.push(parse_value(tokens[0], i + 1)?);
                table.intensity_array.push(parse_value(tokens[1], i + 1)?);
            }
            w => {
                return Err(invalid_data(
                    i + 1,
                    format!("expected one or two columns, found {w}"),
                ))
            }
        }
    }
    log::debug!("Read a signal of {} points", table.len());
    Ok(table)
}

pub fn signal_from_file<P: AsRef<path::Path>>(path: P) -> io::Result<SignalTable> {
    let file = fs::File::open(path)?;
    signal_from_reader(io::BufReader::new(file))
}

/// Write `peaks` as a tab-separated table. When `mz_array` is given, the m/z of
/// each peak's `ridge_index` is included.
pub fn peaks_to_writer<W: Write>(
    mut writer: W,
    peaks: &[MajorPeak],
    mz_array: Option<&[f64]>,
) -> io::Result<()> {
    writeln!(
        writer,
        "name\tindex\tridge_index\tmz\tscale\tamplitude\tnoise\tsnr\tnearby"
    )?;
    for peak in peaks {
        let mz = mz_array
            .and_then(|mzs| mzs.get(peak.ridge_index))
            .map(|mz| mz.to_string())
            .unwrap_or_default();
        let nearby: Vec<&str> = peak.nearby.iter().map(|p| p.name.as_str()).collect();
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            peak.name,
            peak.index,
            peak.ridge_index,
            mz,
            peak.scale,
            peak.amplitude,
            peak.noise,
            peak.snr,
            nearby.join(",")
        )?;
    }
    Ok(())
}

/// Write refined peaks as a tab-separated table
pub fn refined_peaks_to_writer<W: Write>(mut writer: W, peaks: &[RefinedPeak]) -> io::Result<()> {
    writeln!(writer, "name\tcenter\twidth\tarea\tsnr\tstatus")?;
    for peak in peaks {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{:?}",
            peak.peak.name, peak.center, peak.width, peak.area, peak.peak.snr, peak.status
        )?;
    }
    Ok(())
}

pub fn peaks_to_file<P: AsRef<path::Path>>(
    path: P,
    peaks: &[MajorPeak],
    mz_array: Option<&[f64]>,
) -> io::Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);
    peaks_to_writer(&mut writer, peaks, mz_array)?;
    writer.flush()
}
