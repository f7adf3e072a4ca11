use crate::{citation::Citation, claims::Claim};

/// Minimum score at which execution may be unlocked.
pub const RELIABILITY_THRESHOLD: f64 = 0.65;
/// Hard ceiling; the scorer never reports full certainty.
pub const RELIABILITY_CEILING: f64 = 0.95;

const SATURATION: f64 = 5.0;

/// Scores breadth of corroboration. Saturates at five claims and five citations.
///
/// ```text
/// base  = 0.3 + 0.3 * min(max(claims, 1) / 5, 1) + 0.3 * min(max(citations, 1) / 5, 1)
/// score = round2(min(base + 0.1 * avg_confidence, 0.95))
/// ```
#[must_use]
pub fn score(claims: &[Claim], citations: &[Citation]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n_claims = claims.len().max(1) as f64;
    #[allow(clippy::cast_precision_loss)]
    let n_citations = citations.len().max(1) as f64;
    let base = 0.3
        + 0.3 * (n_claims / SATURATION).min(1.0)
        + 0.3 * (n_citations / SATURATION).min(1.0);
    let score = (base + 0.1 * average_confidence(claims)).min(RELIABILITY_CEILING);
    round2(score)
}

/// Mean claim confidence; zero when there are no claims.
#[must_use]
pub fn average_confidence(claims: &[Claim]) -> f64 {
    if claims.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = claims.len() as f64;
    claims.iter().map(|claim| claim.confidence).sum::<f64>() / count
}

/// Execution gate: enough evidence and an explicit execution request.
#[must_use]
pub fn execution_permitted(score: f64, execute_requested: bool) -> bool {
    execute_requested && score >= RELIABILITY_THRESHOLD
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{Stance, PLACEHOLDER_CONFIDENCE};

    fn claims(n: usize, confidence: f64) -> Vec<Claim> {
        (0..n)
            .map(|i| Claim {
                id: format!("cl-{i}"),
                text: "t".into(),
                stance: Stance::Neutral,
                citation_ids: vec![i],
                confidence,
            })
            .collect()
    }

    fn citations(n: usize) -> Vec<Citation> {
        (0..n)
            .map(|i| Citation::new("t", format!("https://u{i}.com"), "s"))
            .collect()
    }

    #[test]
    fn empty_evidence_is_bounded() {
        let value = score(&[], &[]);
        assert!((0.30..=0.95).contains(&value));
        // 0.3 + 0.06 + 0.06 with no confidence bonus
        assert!((value - 0.42).abs() < 1e-9);
        assert!(!execution_permitted(value, true));
    }

    #[test]
    fn saturated_evidence_hits_ceiling() {
        let value = score(&claims(20, 1.0), &citations(20));
        assert!((value - RELIABILITY_CEILING).abs() < 1e-9);
    }

    #[test]
    fn five_placeholder_claims_reach_ceiling() {
        let value = score(&claims(5, PLACEHOLDER_CONFIDENCE), &citations(5));
        assert!((value - 0.95).abs() < 1e-9);
    }

    #[test]
    fn three_claims_clear_threshold() {
        // 0.3 + 0.18 + 0.18 + 0.085 lands just under 0.745 in binary floating point
        let value = score(&claims(3, PLACEHOLDER_CONFIDENCE), &citations(3));
        assert!((value - 0.74).abs() < 1e-9);
        assert!(execution_permitted(value, true));
    }

    #[test]
    fn single_citation_stays_below_threshold() {
        let value = score(&claims(1, PLACEHOLDER_CONFIDENCE), &citations(1));
        assert!((value - 0.51).abs() < 1e-9);
        assert!(!execution_permitted(value, true));
    }

    #[test]
    fn monotonic_in_breadth() {
        let mut previous = 0.0;
        for n in 0..=8 {
            let value = score(&claims(n, 0.8), &citations(n));
            assert!(value >= previous, "score dropped at n={n}");
            assert!((0.30..=0.95).contains(&value));
            previous = value;
        }
        let mut previous = 0.0;
        for n in 0..=8 {
            let value = score(&claims(2, 0.8), &citations(n));
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn average_confidence_is_zero_when_empty() {
        assert!(average_confidence(&[]).abs() < f64::EPSILON);
        assert!((average_confidence(&claims(2, 0.5)) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn gate_requires_both_conditions() {
        assert!(execution_permitted(0.65, true));
        assert!(!execution_permitted(0.64, true));
        assert!(!execution_permitted(0.95, false));
        assert!(!execution_permitted(0.5, false));
    }
}
