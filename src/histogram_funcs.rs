// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

#[derive(Debug)]
pub struct HistogramStats {
    pub mean: f64,
    pub stddev: f64,
}

/// Histogram of u8 values, e.g. one edge row or column of an image.
pub fn histogram_of<I>(values: I) -> [u32; 256]
where I: IntoIterator<Item = u8>
{
    let mut histogram = [0_u32; 256];
    for v in values {
        histogram[v as usize] += 1;
    }
    histogram
}

/// Population statistics of the values counted by `histogram`.
pub fn stats_for_histogram(histogram: &[u32]) -> HistogramStats {
    let mut count: u64 = 0;
    let mut first_moment: u64 = 0;
    for h in 0..histogram.len() {
        let bin_count = histogram[h] as u64;
        count += bin_count;
        first_moment += bin_count * h as u64;
    }
    if count == 0 {
        return HistogramStats{mean: 0.0, stddev: 0.0};
    }
    let mean = first_moment as f64 / count as f64;
    let mut second_moment: f64 = 0.0;
    for h in 0..histogram.len() {
        let bin_count = histogram[h] as f64;
        second_moment += bin_count * (h as f64 - mean) * (h as f64 - mean);
    }
    let stddev = (second_moment / count as f64).sqrt();
    HistogramStats{mean, stddev}
}

// mod tests.
