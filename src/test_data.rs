//! Synthetic spectra for tests.

/// The centre, standard deviation and height of each peak in [`noisy_spectrum`]
pub const PEAKS: [(f64, f64, f64); 3] = [(500.0, 8.0, 100.0), (1000.0, 12.0, 60.0), (1500.0, 5.0, 80.0)];

pub const SPECTRUM_LEN: usize = 2000;

/// Deterministic pseudo-random noise in `(-1, 1)`
pub fn jitter(i: usize) -> f64 {
    ((i as f64 * 12.9898 + 78.233).sin() * 43758.5453).fract()
}

/// A sum of Gaussian peaks, each given as `(center, sigma, height)`
pub fn gaussian_signal(n: usize, peaks: &[(f64, f64, f64)]) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            peaks
                .iter()
                .map(|(mu, sigma, height)| height * (-(x - mu).powi(2) / (2.0 * sigma * sigma)).exp())
                .sum()
        })
        .collect()
}

/// Three well separated peaks of different widths over unit noise
pub fn noisy_spectrum() -> Vec<f64> {
    gaussian_signal(SPECTRUM_LEN, &PEAKS)
        .into_iter()
        .enumerate()
        .map(|(i, y)| y + jitter(i))
        .collect()
}
