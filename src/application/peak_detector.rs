// Peak detector - "Spikiness" peak detection over a float series
//
// Each interior index is scored by half the sum of its largest signed
// difference to the left and to the right within the window. Peaks are the
// scores standing more than `stringency` standard deviations above the mean,
// thinned so that no two retained peaks are closer than the window.

/// Differences at or below this magnitude count as flat.
const FLAT_TOLERANCE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDetector {
    window: usize,
    stringency: f32,
}

impl PeakDetector {
    /// `window` is clamped to at least 1.
    pub fn new(window: usize, stringency: f32) -> Self {
        Self {
            window: window.max(1),
            stringency,
        }
    }

    /// Ascending indexes of the retained peaks in `series`.
    pub fn process(&self, series: &[f32]) -> Vec<usize> {
        if series.len() < 2 * self.window {
            return Vec::new();
        }

        let scores = spikiness(series, self.window);
        let Some((mean, std)) = mean_and_std(&scores) else {
            return Vec::new();
        };
        if std <= 0.0 || !std.is_finite() {
            return Vec::new();
        }

        let candidates: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s > 0.0 && s - mean > self.stringency * std)
            .map(|(i, _)| i)
            .collect();

        prune_close_peaks(series, &candidates, self.window)
    }
}

/// Spikiness score per index; indexes within `window` of either end score 0.
pub fn spikiness(series: &[f32], window: usize) -> Vec<f32> {
    let mut scores = vec![0.0; series.len()];
    if series.len() < 2 * window || window == 0 {
        return scores;
    }

    for i in window..series.len() - window {
        let mut max_left = significant(series[i] - series[i - 1]);
        let mut max_right = significant(series[i] - series[i + 1]);
        for j in 2..=window {
            max_left = max_left.max(significant(series[i] - series[i - j]));
            max_right = max_right.max(significant(series[i] - series[i + j]));
        }
        scores[i] = 0.5 * (max_left + max_right);
    }

    scores
}

fn significant(diff: f32) -> f32 {
    if diff.abs() > FLAT_TOLERANCE { diff } else { 0.0 }
}

/// Mean and unbiased standard deviation (Welford). `None` for fewer than two values.
fn mean_and_std(values: &[f32]) -> Option<(f32, f32)> {
    if values.len() < 2 {
        return None;
    }

    let mut mean = 0.0_f32;
    let mut m2 = 0.0_f32;
    for (n, &value) in values.iter().enumerate() {
        let delta = value - mean;
        mean += delta / (n + 1) as f32;
        m2 += delta * (value - mean);
    }

    let variance = m2 / (values.len() - 1) as f32;
    Some((mean, variance.sqrt()))
}

/// Single pass over adjacent candidate pairs closer than `window`: the one with
/// the lower series value is dropped. Pairs are judged against the original
/// candidate list, not the thinned one.
pub fn prune_close_peaks(series: &[f32], candidates: &[usize], window: usize) -> Vec<usize> {
    let weaker: Vec<usize> = candidates
        .windows(2)
        .filter(|pair| pair[1] - pair[0] < window)
        .map(|pair| {
            if series[pair[1]] > series[pair[0]] {
                pair[0]
            } else {
                pair[1]
            }
        })
        .collect();

    candidates
        .iter()
        .copied()
        .filter(|i| !weaker.contains(i))
        .collect()
}
