//! Property tests for the follow-graph comparison.

use proptest::collection::btree_set;
use proptest::prelude::*;
use starwatch::{UsernameSet, diff};

fn usernames() -> impl Strategy<Value = UsernameSet> {
    btree_set("[a-zA-Z0-9-]{1,8}", 0..24)
}

proptest! {
    #[test]
    fn diff_matches_set_subtraction(followers in usernames(), following in usernames()) {
        let report = diff(&followers, &following);

        let expected_not_following_back: UsernameSet =
            following.iter().filter(|u| !followers.contains(*u)).cloned().collect();
        let expected_not_followed_back: UsernameSet =
            followers.iter().filter(|u| !following.contains(*u)).cloned().collect();

        prop_assert_eq!(report.not_following_back, expected_not_following_back);
        prop_assert_eq!(report.not_followed_back, expected_not_followed_back);
    }

    #[test]
    fn diff_of_identical_sets_is_empty(users in usernames()) {
        prop_assert!(diff(&users, &users).is_empty());
    }

    #[test]
    fn swapping_roles_swaps_the_outputs(followers in usernames(), following in usernames()) {
        let forward = diff(&followers, &following);
        let swapped = diff(&following, &followers);

        prop_assert_eq!(forward.not_following_back, swapped.not_followed_back);
        prop_assert_eq!(forward.not_followed_back, swapped.not_following_back);
    }

    #[test]
    fn outputs_are_disjoint_from_the_intersection(followers in usernames(), following in usernames()) {
        let report = diff(&followers, &following);

        for user in followers.intersection(&following) {
            prop_assert!(!report.not_following_back.contains(user));
            prop_assert!(!report.not_followed_back.contains(user));
        }
        prop_assert!(report.not_following_back.is_disjoint(&report.not_followed_back));
    }
}
