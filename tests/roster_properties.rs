//! Property tests: any sequence of roster operations keeps the roster a
//! bounded, duplicate-free line, and the reversible moves really reverse.

use guild_queue::queue::{GuildQueueState, Roster, MAX_CAPACITY, MIN_CAPACITY};
use guild_queue::reputation::ReputationPolicy;
use guild_queue::types::{Participant, ParticipantId};
use guild_queue::utils::is_valid_claim_code;
use proptest::prelude::*;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum RosterOp {
    Join(ParticipantId),
    Leave(ParticipantId),
    Promote(ParticipantId),
    Demote(ParticipantId),
    Requeue(ParticipantId),
}

fn participant(id: ParticipantId) -> Participant {
    Participant::new(id, format!("villager{}", id))
}

/// Small id space so operations keep hitting participants that are queued
fn arb_op() -> impl Strategy<Value = RosterOp> {
    let id = 0u64..12;
    prop_oneof![
        3 => id.clone().prop_map(RosterOp::Join),
        1 => id.clone().prop_map(RosterOp::Leave),
        1 => id.clone().prop_map(RosterOp::Promote),
        1 => id.clone().prop_map(RosterOp::Demote),
        1 => id.prop_map(RosterOp::Requeue),
    ]
}

fn apply(roster: &mut Roster, op: &RosterOp) {
    // Failures are part of the property: they must leave the roster valid
    let _ = match op {
        RosterOp::Join(id) => roster.join(participant(*id)).map(|_| ()),
        RosterOp::Leave(id) => roster.leave(*id).map(|_| ()),
        RosterOp::Promote(id) => roster.promote(*id).map(|_| ()),
        RosterOp::Demote(id) => roster.demote(*id).map(|_| ()),
        RosterOp::Requeue(id) => roster.requeue_behind_head(participant(*id)).map(|_| ()),
    };
}

fn ids(roster: &Roster) -> Vec<ParticipantId> {
    roster.participants().iter().map(|p| p.id).collect()
}

fn roster_of(members: &[ParticipantId], capacity: usize) -> Roster {
    let mut roster = Roster::new(capacity);
    for &id in members {
        roster.join(participant(id)).unwrap();
    }
    roster
}

/// Distinct member ids, in arrival order
fn arb_members(max: usize) -> impl Strategy<Value = Vec<ParticipantId>> {
    prop::collection::hash_set(0u64..1000, 1..max).prop_map(|set| set.into_iter().collect())
}

/// Five characters from the claim-code alphabet
fn arb_claim_code() -> impl Strategy<Value = String> {
    "[0-9A-HJ-NP-Ya-hj-np-y]{5}"
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Joins never push the roster past capacity and never duplicate anyone
    #[test]
    fn roster_stays_bounded_and_unique(
        capacity in MIN_CAPACITY..=12usize,
        ops in prop::collection::vec(arb_op(), 0..80),
    ) {
        let mut roster = Roster::new(capacity);
        for op in &ops {
            apply(&mut roster, op);

            let current = ids(&roster);
            prop_assert!(current.len() <= capacity);
            prop_assert_eq!(current.iter().collect::<HashSet<_>>().len(), current.len());
        }
    }

    /// Joining twice is rejected and changes nothing
    #[test]
    fn duplicate_join_is_a_no_op(members in arb_members(10), pick in any::<prop::sample::Index>()) {
        let mut roster = roster_of(&members, MAX_CAPACITY);
        let before = ids(&roster);
        let again = members[pick.index(members.len())];

        prop_assert!(roster.join(participant(again)).is_err());
        prop_assert_eq!(ids(&roster), before);
    }

    /// Promote followed by demote puts everyone back where they were
    #[test]
    fn promote_then_demote_restores_order(members in arb_members(10), pick in any::<prop::sample::Index>()) {
        prop_assume!(members.len() >= 2);
        let mut roster = roster_of(&members, MAX_CAPACITY);
        let before = ids(&roster);
        // Anyone but the head can be promoted
        let target = members[1 + pick.index(members.len() - 1)];

        let position = roster.promote(target).unwrap();
        prop_assert_eq!(roster.demote(target).unwrap(), position + 1);
        prop_assert_eq!(ids(&roster), before);
    }

    /// Leaving and rejoining moves a participant to the tail, keeping the
    /// relative order of everyone else
    #[test]
    fn leave_then_join_goes_to_tail(members in arb_members(10), pick in any::<prop::sample::Index>()) {
        let mut roster = roster_of(&members, MAX_CAPACITY);
        let target = members[pick.index(members.len())];

        roster.leave(target).unwrap();
        let position = roster.join(participant(target)).unwrap();

        let mut expected: Vec<_> = members.iter().copied().filter(|id| *id != target).collect();
        expected.push(target);
        prop_assert_eq!(position, members.len());
        prop_assert_eq!(ids(&roster), expected);
    }

    /// A requeued claimant always lands directly behind the head
    #[test]
    fn requeue_lands_second(members in arb_members(10)) {
        prop_assume!(members.len() >= 2);
        let mut roster = roster_of(&members, MAX_CAPACITY);
        let head = members[0];

        let index = roster.requeue_behind_head(participant(head)).unwrap();
        prop_assert_eq!(index, 1);
        prop_assert_eq!(ids(&roster)[1], head);
        prop_assert_eq!(ids(&roster)[0], members[1]);
    }

    /// The head survives any number of decay ticks
    #[test]
    fn decay_never_evicts_the_head(members in arb_members(6), ticks in 1usize..12) {
        let policy = ReputationPolicy::default();
        let mut state = GuildQueueState::new(1, MAX_CAPACITY);
        for &id in &members {
            state.join(participant(id)).unwrap();
        }
        let head = participant(members[0]);
        let token = state.claim(&head, Some("A7x92"), 1).unwrap().token;
        for &id in &members {
            state.acknowledge(&participant(id), token, guild_queue::types::AckKind::Confirm, &policy);
        }

        for _ in 0..ticks {
            state.decay(&policy);
            prop_assert_eq!(state.roster().head().map(|p| p.id), Some(head.id));
        }
    }

    /// Generated codes from the alphabet are always accepted
    #[test]
    fn claim_codes_from_alphabet_are_valid(code in arb_claim_code()) {
        prop_assert!(is_valid_claim_code(&code));
    }

    /// Codes containing an ambiguous character are always rejected
    #[test]
    fn ambiguous_characters_are_rejected(
        prefix in "[0-9A-HJ-N]{0,4}",
        bad in prop::sample::select(vec!['I', 'O', 'Z', 'i', 'o', 'z']),
    ) {
        let mut code = prefix.clone();
        code.push(bad);
        while code.chars().count() < 5 {
            code.push('7');
        }
        prop_assert!(!is_valid_claim_code(&code));
    }
}
