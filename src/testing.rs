use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::HashMap;

/// Every label sequence of length `n_positions` over classes `1..=n_classes`.
pub fn label_sequences(n_positions: usize, n_classes: usize) -> Vec<Vec<usize>> {
    let mut sequences = vec![Vec::with_capacity(n_positions)];
    for _ in 0..n_positions {
        sequences = sequences
            .into_iter()
            .flat_map(|prefix| {
                (1..=n_classes).map(move |c| {
                    let mut sequence = prefix.clone();
                    sequence.push(c);
                    sequence
                })
            })
            .collect();
    }
    sequences
}

pub fn assert_goodness_of_fit(
    n_samples: usize,
    n_positions: usize,
    n_classes: usize,
    mut sample: impl FnMut() -> Vec<usize>,
    log_prob: impl Fn(&[usize]) -> f64,
    alpha: f64,
) -> Option<String> {
    let ns = n_samples as f64;
    let mut map = HashMap::new();
    for _ in 0..n_samples {
        *map.entry(sample()).or_insert(0) += 1;
    }
    let threshold = 5.0;
    let mut chisq = 0.0;
    let mut df = 0;
    let mut observed = 0;
    let mut expected = 0.0;
    for labels in label_sequences(n_positions, n_classes) {
        observed += *map.get(&labels).unwrap_or(&0);
        expected += ns * log_prob(&labels[..]).exp();
        if expected >= threshold {
            let o = observed as f64;
            chisq += (o - expected) * (o - expected) / expected;
            df += 1;
            observed = 0;
            expected = 0.0;
        }
    }
    let distr = ChiSquared::new((df - 1) as f64).unwrap();
    let p_value = 1.0 - distr.cdf(chisq);
    if p_value <= alpha {
        Some(format!(
            "Rejected goodness of fit test... p-value: {:.8}, chisq: {:.2}, df: {}",
            p_value, chisq, df
        ))
    } else {
        None
    }
}

pub fn assert_sums_to_one(
    n_positions: usize,
    n_classes: usize,
    log_prob: impl Fn(&[usize]) -> f64,
    epsilon: f64,
) {
    let sum: f64 = label_sequences(n_positions, n_classes)
        .iter()
        .map(|labels| log_prob(&labels[..]).exp())
        .sum();
    assert!(
        1.0 - epsilon <= sum && sum <= 1.0 + epsilon,
        "Total probability should be one, but is {}.",
        sum
    );
}

#[test]
fn test_label_sequences() {
    let sequences = label_sequences(3, 2);
    assert_eq!(sequences.len(), 8);
    assert_eq!(sequences[0], vec![1, 1, 1]);
    assert_eq!(sequences[7], vec![2, 2, 2]);
    assert_eq!(label_sequences(0, 4), vec![Vec::<usize>::new()]);
}
