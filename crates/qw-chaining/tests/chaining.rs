//! Chaining scenarios over the house fixture.

use qw_chaining::{Chain, ChainError, ChainResult, ChainingOptions, get_chains, sample_quest};
use qw_core::{GameLogic, State};

const HOUSE: &str = include_str!("../../../fixtures/house.twl");

const PARALLEL: &str = r#"
    type foo {
        predicates { a(foo); b(foo); c(foo); not_a(foo); not_b(foo); not_c(foo); }
        rules {
            do_a :: not_a(foo) & $not_c(foo) -> a(foo);
            do_b :: not_b(foo) & $not_c(foo) -> b(foo);
            do_c :: $a(foo) & $b(foo) & not_c(foo) -> c(foo);
        }
        constraints {
            a_or_not_a :: a(foo) & not_a(foo) -> fail();
            b_or_not_b :: b(foo) & not_b(foo) -> fail();
            c_or_not_c :: c(foo) & not_c(foo) -> fail();
        }
    }
"#;

const BEDROOM: &str = "at(P, bedroom: r) & link(bedroom, wdoor: d, kitchen: r) & free(bedroom, kitchen) \
    & free(kitchen, bedroom) & open(wdoor) & in(carrot: f, I) & at(chest: c, kitchen) & open(chest)";

fn logic(source: &str) -> GameLogic {
    qw_dsl::parse_logic(source).expect("logic compiles")
}

fn state(logic: &GameLogic, facts: &str) -> State {
    logic
        .new_state(qw_dsl::parse_facts(facts).expect("facts parse"))
        .expect("facts form a state")
}

fn chains(logic: &GameLogic, state: &State, options: ChainingOptions) -> Vec<Chain> {
    get_chains(logic, state, options)
        .expect("options resolve")
        .collect::<ChainResult<Vec<_>>>()
        .expect("chaining succeeds")
}

fn names(chain: &Chain) -> Vec<&str> {
    chain.actions().map(|a| a.name()).collect()
}

fn replay(logic: &GameLogic, chain: &Chain) -> State {
    let mut state = chain.initial_state.copy();
    for action in chain.actions() {
        assert!(state.apply(action).unwrap(), "{action} is not applicable in {state}");
        assert!(!logic.is_violated(&state), "{action} leads to a forbidden state");
    }
    state
}

// ---------------------------------------------------------------------------
// Door opening
// ---------------------------------------------------------------------------

#[test]
fn forward_open_door_then_walk_through() {
    let logic = logic(HOUSE);
    let start = state(
        &logic,
        "at(P, r0: r) & link(r0, d: d, r1: r) & closed(d) & free(r0, r1) & free(r1, r0)",
    );
    let options = ChainingOptions::default()
        .with_depth(1, 2)
        .with_rules_per_depth([vec!["open/d"], vec!["go/east"]]);

    let found = chains(&logic, &start, options);
    assert_eq!(found.len(), 1);
    assert_eq!(names(&found[0]), vec!["open/d", "go/east"]);
    assert_eq!(found[0].initial_state, start);
    let last = found[0].final_state().unwrap();
    assert!(last.is_fact(&qw_dsl::parse_proposition("at(P, r1: r)").unwrap()));
}

#[test]
fn backward_chain_replays_forward() {
    let logic = logic(HOUSE);
    let end = state(
        &logic,
        "at(P, r1: r) & link(r0: r, d: d, r1) & open(d) & free(r0, r1) & free(r1, r0)",
    );
    let options = ChainingOptions::default()
        .with_backward(true)
        .with_depth(1, 2)
        .with_rules_per_depth([vec!["go/east"], vec!["open/d"]]);

    let found = chains(&logic, &end, options);
    assert_eq!(found.len(), 1);
    let chain = &found[0];
    assert_eq!(names(chain), vec!["open/d", "go/east"]);

    let initial: Vec<String> = chain.initial_state.facts().map(ToString::to_string).collect();
    assert!(initial.contains(&"closed(d)".to_string()));
    assert!(initial.contains(&"at(P, r0)".to_string()));
    assert_eq!(replay(&logic, chain), end);
    assert_eq!(chain.actions().next().unwrap().command_template(), Some("open {d}"));
}

// ---------------------------------------------------------------------------
// Parallel subchains
// ---------------------------------------------------------------------------

fn parallel_options() -> ChainingOptions {
    ChainingOptions::default().with_backward(true).with_depth(1, 3)
}

#[test]
fn parallel_quests_single_breadth() {
    let logic = logic(PARALLEL);
    let end = state(&logic, "a(foo) & b(foo) & c(foo)");

    let found = chains(&logic, &end, parallel_options().with_breadth(1, 1));
    assert_eq!(found.len(), 2);
    for chain in &found {
        assert_eq!(chain.len(), 2);
        assert_eq!(names(chain)[1], "do_c");
        assert_eq!(replay(&logic, chain), end);
    }
}

#[test]
fn parallel_quests_with_a_second_subchain() {
    let logic = logic(PARALLEL);
    let end = state(&logic, "a(foo) & b(foo) & c(foo)");

    let found = chains(&logic, &end, parallel_options().with_breadth(1, 2));
    assert_eq!(found.len(), 3);

    let found = chains(&logic, &end, parallel_options().with_breadth(2, 2));
    assert_eq!(found.len(), 1);
    let chain = &found[0];
    assert_eq!(chain.breadth(), 2);

    let shape: Vec<(usize, usize, Option<usize>)> =
        chain.nodes.iter().map(|n| (n.depth, n.breadth, n.parent)).collect();
    assert_eq!(shape, vec![(2, 2, Some(2)), (2, 1, Some(2)), (1, 1, None)]);
    assert_eq!(names(chain), vec!["do_b", "do_a", "do_c"]);
    assert_eq!(replay(&logic, chain), end);
}

// ---------------------------------------------------------------------------
// General properties
// ---------------------------------------------------------------------------

#[test]
fn forward_chains_replay_without_breaking_constraints() {
    let logic = logic(HOUSE);
    let start = state(&logic, BEDROOM);
    let options = ChainingOptions::default().with_depth(1, 3).with_breadth(1, 2);

    let found = chains(&logic, &start, options);
    assert!(!found.is_empty());
    for chain in &found {
        assert!(chain.len() <= 6);
        assert!(chain.actions().all(|a| a.name() != "look"));
        replay(&logic, chain);
    }
}

#[test]
fn chaining_is_deterministic() {
    let logic = logic(HOUSE);
    let start = state(&logic, BEDROOM);
    let run = || -> Vec<String> {
        let options = ChainingOptions::default().with_depth(1, 3);
        chains(&logic, &start, options).iter().map(ToString::to_string).collect()
    };
    assert_eq!(run(), run());
}

#[test]
fn seeded_runs_shuffle_the_same_chains() {
    let logic = logic(HOUSE);
    let start = state(&logic, BEDROOM);
    let run = |options: ChainingOptions| -> Vec<String> {
        let mut found: Vec<String> = chains(&logic, &start, options).iter().map(ToString::to_string).collect();
        found.sort();
        found
    };
    let plain = run(ChainingOptions::default().with_depth(1, 2));
    let seeded = run(ChainingOptions::default().with_depth(1, 2).with_seed(3));
    assert_eq!(plain, seeded);

    let first = || sample_quest(&logic, &start, ChainingOptions::default().with_depth(1, 2).with_seed(11)).unwrap();
    assert_eq!(first().to_string(), first().to_string());
}

#[test]
fn single_rule_per_depth() {
    let logic = logic(HOUSE);
    let start = state(&logic, BEDROOM);
    let options = ChainingOptions::default().with_rules_per_depth([vec!["drop"]]);

    let found = chains(&logic, &start, options);
    assert!(!found.is_empty());
    assert!(found.iter().flat_map(|c| c.actions()).all(|a| a.name() == "drop"));
}

#[test]
fn max_length_bounds_the_total_number_of_actions() {
    let logic = logic(PARALLEL);
    let end = state(&logic, "a(foo) & b(foo) & c(foo)");
    let options = parallel_options()
        .with_breadth(1, 2)
        .with_length(1, Some(2));

    let found = chains(&logic, &end, options);
    assert!(!found.is_empty());
    assert!(found.iter().all(|c| c.len() <= 2));
}

#[test]
fn backward_chaining_creates_missing_variables() {
    let logic = logic(HOUSE);
    let end = state(&logic, "in(carrot: f, I)");
    let options = ChainingOptions::default()
        .with_backward(true)
        .with_create_variables(true)
        .with_restricted_types(["o", "f", "k"])
        .with_rules_per_depth([vec!["take"]]);

    let found = chains(&logic, &end, options);
    assert_eq!(found.len(), 1);
    let chain = &found[0];
    let initial: Vec<String> = chain.initial_state.facts().map(ToString::to_string).collect();
    assert!(initial.contains(&"at(carrot, r_0)".to_string()), "{initial:?}");
    assert!(initial.contains(&"at(P, r_0)".to_string()), "{initial:?}");
    let last = replay(&logic, chain);
    assert!(end.facts().all(|fact| last.is_fact(fact)));
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn sample_quest_without_chain_is_an_error() {
    let logic = logic(HOUSE);
    let start = state(&logic, "at(P, attic: r)");
    let err = sample_quest(&logic, &start, ChainingOptions::default()).unwrap_err();
    assert!(matches!(err, ChainError::QuestGeneration));
}

#[test]
fn unknown_rule_in_schedule() {
    let logic = logic(HOUSE);
    let start = state(&logic, BEDROOM);
    let options = ChainingOptions::default().with_rules_per_depth([vec!["fly"]]);
    let err = get_chains(&logic, &start, options).err().unwrap();
    assert!(matches!(err, ChainError::UnknownRule { depth: 0, ref name } if name == "fly"));
}
