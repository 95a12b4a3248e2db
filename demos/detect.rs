use std::{env, io};

use mzwavelet::text::{peaks_to_writer, refined_peaks_to_writer, signal_from_file};
use mzwavelet::{LocalMaximumStrategy, PeakDetectorBuilder, ScaleSet};

fn main() -> io::Result<()> {
    pretty_env_logger::init_timed();

    let path = env::args().nth(1).expect("Expected a path to a signal file");
    let strategy: LocalMaximumStrategy = env::args()
        .nth(2)
        .unwrap_or_else(|| "faster".to_string())
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let table = signal_from_file(&path)?;
    let detector = PeakDetectorBuilder::new()
        .strategy(strategy)
        .refine(true)
        .build();
    let result = detector
        .detect(&table.intensity_array, &ScaleSet::default())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    eprintln!(
        "Found {} peaks along {} ridges in {} points",
        result.major_peaks.len(),
        result.ridges.len(),
        table.len()
    );
    let mut stdout = io::stdout().lock();
    peaks_to_writer(&mut stdout, &result.major_peaks, Some(table.mz_array.as_slice()))?;
    if let Some(refined) = result.refined_peaks.as_ref() {
        refined_peaks_to_writer(&mut stdout, refined)?;
    }
    Ok(())
}
