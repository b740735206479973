//! ROC-AUC via the Mann-Whitney U statistic.
//!
//! O(N log N): one sort, then a linear scan that averages ranks over ties.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("Degenerate evaluation: {positives} positive and {negatives} negative labels")]
    Degenerate { positives: usize, negatives: usize },
    #[error("Got {scores} scores for {labels} labels")]
    LengthMismatch { scores: usize, labels: usize },
}

/// Logistic squashing of a raw similarity score
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Area under the ROC curve for binary `labels` (1 = positive)
///
/// Fails if the labels contain a single class, since the curve is undefined.
pub fn roc_auc(scores: &[f32], labels: &[f32]) -> Result<f64, EvaluationError> {
    if scores.len() != labels.len() {
        return Err(EvaluationError::LengthMismatch {
            scores: scores.len(),
            labels: labels.len(),
        });
    }

    let positives = labels.iter().filter(|&&l| l > 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(EvaluationError::Degenerate {
            positives,
            negatives,
        });
    }

    let mut ranked: Vec<(f32, bool)> = scores
        .iter()
        .zip(labels)
        .map(|(&s, &l)| (s, l > 0.5))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum_pos = 0.0f64;
    let mut i = 0;
    while i < ranked.len() {
        let mut j = i;
        while j < ranked.len() && ranked[j].0 == ranked[i].0 {
            j += 1;
        }
        // 1-based average rank of the tie group
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let tied_pos = ranked[i..j].iter().filter(|(_, pos)| *pos).count();
        rank_sum_pos += avg_rank * tied_pos as f64;
        i = j;
    }

    let p = positives as f64;
    let n = negatives as f64;
    let u = rank_sum_pos - p * (p + 1.0) / 2.0;
    Ok((u / (p * n)).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_separation() {
        let auc = roc_auc(&[0.1, 0.2, 0.8, 0.9], &[0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!((auc - 1.0).abs() < 1e-10);
    }

    #[test]
    fn inverse_separation() {
        let auc = roc_auc(&[0.9, 0.8, 0.1], &[0.0, 0.0, 1.0]).unwrap();
        assert!(auc < 1e-10);
    }

    #[test]
    fn all_ties_is_random() {
        let auc = roc_auc(&[0.5; 6], &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]).unwrap();
        assert!((auc - 0.5).abs() < 1e-10);
    }

    #[test]
    fn known_value() {
        // pos = [3, 5], neg = [1, 2, 4] -> U = 5, AUC = 5/6
        let auc = roc_auc(&[3.0, 5.0, 1.0, 2.0, 4.0], &[1.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!((auc - 5.0 / 6.0).abs() < 1e-10);
    }

    #[test]
    fn single_class_is_degenerate() {
        let err = roc_auc(&[0.3, 0.7], &[1.0, 1.0]).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::Degenerate {
                positives: 2,
                negatives: 0
            }
        );
        assert!(roc_auc(&[], &[]).is_err());
    }

    #[test]
    fn sigmoid_is_monotone_and_bounded() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-7);
        assert!(sigmoid(-50.0) >= 0.0 && sigmoid(50.0) <= 1.0);
        assert!(sigmoid(1.0) > sigmoid(-1.0));
    }
}
