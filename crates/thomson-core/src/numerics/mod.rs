//! Small numeric kernels used by the integration and fitting stages.

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value);
    }

    sum
}

/// Compensated sum of `f(item)` over an iterator.
pub fn stable_sum_by<I, F>(items: I, mut f: F) -> f64
where
    I: IntoIterator,
    F: FnMut(I::Item) -> f64,
{
    let mut sum = 0.0;
    let mut correction = 0.0;
    for item in items {
        kahan_add(&mut sum, &mut correction, f(item));
    }
    sum
}

pub fn deterministic_argsort(values: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_unstable_by(|lhs, rhs| {
        values[*lhs]
            .total_cmp(&values[*rhs])
            .then_with(|| lhs.cmp(rhs))
    });
    indices
}

/// Index of the smallest value, first occurrence on ties. NaN sorts last.
pub fn argmin(values: &[f64]) -> Option<usize> {
    deterministic_argsort(values).into_iter().next()
}

/// Index of the first occurrence of the largest value.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// Median with the midpoint convention for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[middle])
    } else {
        Some((sorted[middle - 1] + sorted[middle]) / 2.0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(stable_sum(values) / values.len() as f64)
}

/// Sample standard deviation (`n - 1` denominator); needs at least 2 values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let center = mean(values)?;
    let squares = stable_sum_by(values, |value| (value - center) * (value - center));
    Some((squares / (values.len() - 1) as f64).sqrt())
}

/// First index whose value is not less than `target` in an ascending slice.
pub fn bisect_left(sorted: &[f64], target: f64) -> usize {
    sorted.partition_point(|value| *value < target)
}

/// First index whose value is greater than `target` in an ascending slice.
pub fn bisect_right(sorted: &[f64], target: f64) -> usize {
    sorted.partition_point(|value| *value <= target)
}
