//! The planner: expands a route into a fixed `ToolPlan` and enforces
//! a step budget.

use common::model::{RoutePath, StepTag, ToolPlan};
use tracing::debug;

pub fn plan_for(route: RoutePath) -> ToolPlan {
    let steps = match route {
        RoutePath::Direct => vec![StepTag::Synthesis],
        RoutePath::Document => vec![StepTag::DocumentRetrieval, StepTag::Synthesis],
        RoutePath::Graph => vec![StepTag::GraphRetrieval, StepTag::Synthesis],
        RoutePath::Hybrid => vec![
            StepTag::DocumentRetrieval,
            StepTag::GraphRetrieval,
            StepTag::HybridMerge,
            StepTag::Synthesis,
        ],
        RoutePath::Aggregate => vec![StepTag::AggregateRetrieval, StepTag::Synthesis],
    };
    ToolPlan::new(steps)
}

/// Budget gate: `true` when the plan must be rejected before any
/// retrieval runs.
pub fn exceeds_budget(plan: &ToolPlan, max_steps: usize) -> bool {
    let exceeded = plan.len() > max_steps;
    if exceeded {
        debug!(plan_len = plan.len(), max_steps, "planner budget exceeded");
    }
    exceeded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_plan_shape() {
        let plan = plan_for(RoutePath::Hybrid);
        assert_eq!(
            plan.steps,
            vec![
                StepTag::DocumentRetrieval,
                StepTag::GraphRetrieval,
                StepTag::HybridMerge,
                StepTag::Synthesis
            ]
        );
    }

    #[test]
    fn budget_gate_trips() {
        let plan = plan_for(RoutePath::Hybrid);
        assert!(exceeds_budget(&plan, 3));
        assert!(!exceeds_budget(&plan, 4));
    }
}
