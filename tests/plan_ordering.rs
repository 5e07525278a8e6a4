use proptest::prelude::*;
use recoflow::execution::{AffectedItem, Priority, StepAction, build_plan};

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Critical),
        Just(Priority::High),
        Just(Priority::Standard),
        Just(Priority::Low),
    ]
}

fn arb_items(max: usize) -> impl Strategy<Value = Vec<AffectedItem>> {
    prop::collection::vec((arb_priority(), 0.0f64..500.0), 0..max).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (priority, weight_kg))| AffectedItem {
                id: format!("item-{i}"),
                priority,
                weight_kg,
            })
            .collect()
    })
}

proptest! {
    /// The plan is always validate, then one rebooking per item, then verify.
    #[test]
    fn plan_shape_is_validate_rebooks_verify(items in arb_items(16)) {
        let plan = build_plan("FL-1", &items);
        prop_assert_eq!(plan.len(), items.len() + 2);
        prop_assert!(
            matches!(plan[0].action, StepAction::ValidateCapacity { .. }),
            "first step must be ValidateCapacity"
        );
        prop_assert!(
            matches!(plan[plan.len() - 1].action, StepAction::VerifyCompletion { .. }),
            "last step must be VerifyCompletion"
        );
        for (idx, step) in plan.iter().enumerate() {
            prop_assert_eq!(step.sequence as usize, idx + 1);
        }
    }

    /// Rebooking steps are ordered by priority tier, and the original input
    /// order is preserved within a tier.
    #[test]
    fn rebooks_are_stably_priority_sorted(items in arb_items(16)) {
        let plan = build_plan("FL-1", &items);
        let rebooks: Vec<(Priority, String)> = plan
            .iter()
            .filter_map(|s| match &s.action {
                StepAction::Rebook { item_id, priority, .. } => {
                    Some((*priority, item_id.clone()))
                }
                _ => None,
            })
            .collect();

        let mut expected: Vec<(Priority, String)> = items
            .iter()
            .map(|i| (i.priority, i.id.clone()))
            .collect();
        expected.sort_by_key(|(priority, _)| *priority);
        prop_assert_eq!(rebooks, expected);
    }

    /// The capacity check always covers the total weight of all items.
    #[test]
    fn validation_covers_total_weight(items in arb_items(16)) {
        let plan = build_plan("FL-1", &items);
        let total: f64 = items.iter().map(|i| i.weight_kg).sum();
        match &plan[0].action {
            StepAction::ValidateCapacity { required_weight_kg, .. } => {
                prop_assert!((required_weight_kg - total).abs() < 1e-9);
            }
            other => prop_assert!(false, "expected validation step, got {:?}", other),
        }
    }
}
