use indexmap::IndexMap;
use serde::Serialize;

use crate::model::{Comparison, Evaluation, TIE};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemSummary {
    pub wins: usize,
    pub ties: usize,
    pub losses: usize,
    pub evaluated: usize,
    pub mean_score: Option<f64>,
}

/// Read-only aggregate of a comparison; recomputed from the stored evaluations on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_cost: f64,
    pub systems: IndexMap<String, SystemSummary>,
}

impl ComparisonSummary {
    pub fn from_comparison(comparison: &Comparison) -> Self {
        let mut systems = IndexMap::<String, SystemSummary>::new();
        let mut score_sums = IndexMap::<String, (f64, usize)>::new();
        let mut successful = 0usize;
        let mut total_cost = 0.0_f64;

        for result in &comparison.evaluations {
            for label in result.run_results.keys() {
                systems.entry(label.clone()).or_default();
            }

            let Evaluation::Judged {
                winner,
                scores,
                cost,
                ..
            } = &result.evaluation
            else {
                continue;
            };
            successful += 1;
            total_cost += cost.unwrap_or(0.0);

            for label in result.run_results.keys() {
                let entry = systems.entry(label.clone()).or_default();
                entry.evaluated += 1;
                match winner.as_deref() {
                    Some(TIE) => entry.ties += 1,
                    Some(name) if name == label.as_str() => entry.wins += 1,
                    Some(_) => entry.losses += 1,
                    None => {}
                }
            }

            for (label, score) in scores {
                let sum = score_sums.entry(label.clone()).or_insert((0.0, 0));
                sum.0 += score;
                sum.1 += 1;
            }
        }

        for (label, (sum, count)) in score_sums {
            if count > 0 {
                systems.entry(label).or_default().mean_score = Some(sum / count as f64);
            }
        }

        let total = comparison.evaluations.len();
        Self {
            total,
            successful,
            failed: total - successful,
            total_cost,
            systems,
        }
    }

    /// Label with strictly the most wins; `None` when nobody won or the top win count is shared.
    pub fn leader(&self) -> Option<&str> {
        let top = self.systems.values().map(|summary| summary.wins).max()?;
        if top == 0 {
            return None;
        }
        let mut leaders = self.systems.iter().filter(|(_, summary)| summary.wins == top);
        let (label, _) = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        Some(label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(wins: &[(&str, usize)]) -> ComparisonSummary {
        ComparisonSummary {
            total: 0,
            successful: 0,
            failed: 0,
            total_cost: 0.0,
            systems: wins
                .iter()
                .map(|(label, wins)| {
                    let summary = SystemSummary {
                        wins: *wins,
                        ..SystemSummary::default()
                    };
                    (label.to_string(), summary)
                })
                .collect(),
        }
    }

    #[test]
    fn leader_is_the_single_system_with_most_wins() {
        assert_eq!(summary(&[("alpha", 3), ("beta", 5), ("gamma", 1)]).leader(), Some("beta"));
    }

    #[test]
    fn shared_top_win_count_has_no_leader() {
        assert_eq!(summary(&[("alpha", 4), ("beta", 4), ("gamma", 1)]).leader(), None);
        assert_eq!(summary(&[("alpha", 0), ("beta", 0)]).leader(), None);
        assert_eq!(summary(&[]).leader(), None);
    }
}
