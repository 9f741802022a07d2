use fleece_core::crdt::{FieldClock, merge_issue, merge_snapshots};
use fleece_core::model::Issue;
use proptest::prelude::*;
use std::collections::BTreeSet;

use generators::*;

fn expected<T: Clone>(local: &FieldClock<T>, remote: &FieldClock<T>) -> FieldClock<T> {
    if local.last_update > remote.last_update {
        local.clone()
    } else {
        remote.clone()
    }
}

fn clocks_distinct(a: &Issue, b: &Issue) -> bool {
    a.title.last_update != b.title.last_update
        && a.status.last_update != b.status.last_update
        && a.issue_type.last_update != b.issue_type.last_update
        && a.assigned_to.last_update != b.assigned_to.last_update
        && a.linked_pr.last_update != b.linked_pr.last_update
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(2000))]

    #[test]
    fn clocked_fields_take_the_newer_side(
        local in arb_issue("fl-aaaaaa"),
        remote in arb_issue("fl-aaaaaa"),
    ) {
        let merged = merge_issue(&local, &remote);
        prop_assert_eq!(merged.title, expected(&local.title, &remote.title));
        prop_assert_eq!(merged.status, expected(&local.status, &remote.status));
        prop_assert_eq!(merged.issue_type, expected(&local.issue_type, &remote.issue_type));
        prop_assert_eq!(merged.assigned_to, expected(&local.assigned_to, &remote.assigned_to));
        prop_assert_eq!(merged.linked_pr, expected(&local.linked_pr, &remote.linked_pr));
    }

    #[test]
    fn merge_with_self_is_identity(issue in arb_issue("fl-aaaaaa")) {
        prop_assert_eq!(merge_issue(&issue, &issue), issue);
    }

    #[test]
    fn remerging_remote_changes_nothing(
        local in arb_issue("fl-aaaaaa"),
        remote in arb_issue("fl-aaaaaa"),
    ) {
        let once = merge_issue(&local, &remote);
        let twice = merge_issue(&once, &remote);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn sets_and_parent_ids_are_unions(
        local in arb_issue("fl-aaaaaa"),
        remote in arb_issue("fl-aaaaaa"),
    ) {
        let merged = merge_issue(&local, &remote);

        let tags: BTreeSet<String> = local.tags.union(&remote.tags).cloned().collect();
        prop_assert_eq!(&merged.tags, &tags);

        let links: BTreeSet<String> =
            local.linked_issues.union(&remote.linked_issues).cloned().collect();
        prop_assert_eq!(&merged.linked_issues, &links);

        let parents: BTreeSet<&str> = local.parent_ids().chain(remote.parent_ids()).collect();
        let merged_parents: BTreeSet<&str> = merged.parent_ids().collect();
        prop_assert_eq!(merged_parents, parents);
        prop_assert_eq!(merged.parent_issues.len(), merged.parent_ids().collect::<BTreeSet<_>>().len());
    }

    #[test]
    fn replicas_converge_on_clocked_fields_and_sets(
        a in arb_issue("fl-aaaaaa"),
        b in arb_issue("fl-aaaaaa"),
    ) {
        prop_assume!(clocks_distinct(&a, &b));
        let ab = merge_issue(&a, &b);
        let ba = merge_issue(&b, &a);

        prop_assert_eq!(&ab.title, &ba.title);
        prop_assert_eq!(&ab.status, &ba.status);
        prop_assert_eq!(&ab.issue_type, &ba.issue_type);
        prop_assert_eq!(&ab.assigned_to, &ba.assigned_to);
        prop_assert_eq!(&ab.linked_pr, &ba.linked_pr);
        prop_assert_eq!(&ab.tags, &ba.tags);
        prop_assert_eq!(&ab.linked_issues, &ba.linked_issues);
        prop_assert_eq!(ab.last_update(), ba.last_update());
    }

    #[test]
    fn snapshot_merge_unions_ids_and_sorts(
        local in arb_snapshot(),
        remote in arb_snapshot(),
    ) {
        let result = merge_snapshots(&local, &remote);

        let ids: BTreeSet<&str> = local
            .iter()
            .chain(remote.iter())
            .map(|i| i.id.as_str())
            .collect();
        let merged_ids: Vec<&str> = result.issues.iter().map(|i| i.id.as_str()).collect();
        prop_assert_eq!(merged_ids, ids.into_iter().collect::<Vec<_>>());

        let stats = result.stats;
        prop_assert_eq!(
            stats.new_local + stats.new_remote + stats.merged + stats.identical,
            result.issues.len()
        );
    }
}
