use cpbench_core::solution_log::{OPTIMALITY_PROVEN, SOLUTION_SEPARATOR};
use cpbench_core::{parse_log, RunStatus, SolutionBlock, StatValue};

const OPTIMAL_LOG: &str = "\
Successor = [2, 3, 1];
_OutgoingCost = [1, 2, 3];
%%  objective=10
%%  numberOfDecisions=4
----------
Successor = [3, 1, 2];
_OutgoingCost = [1, 1, 1];
%%  objective=7
%%  numberOfDecisions=9
----------
==========
";

#[test]
fn optimal_log_yields_two_solutions_and_final_statistics() {
    let outcome = parse_log(OPTIMAL_LOG);

    assert_eq!(outcome.status, RunStatus::Optimal);
    assert!(outcome.optimality_proven);
    assert_eq!(outcome.solutions.len(), 2);
    assert_eq!(outcome.objective(), Some(7));
    assert_eq!(
        outcome.statistics["numberOfDecisions"],
        StatValue::Integer(9)
    );

    for solution in &outcome.solutions {
        assert!(solution.iter().all(|(name, _)| !name.starts_with('_')));
        assert!(solution.get("Successor").is_some());
    }
    assert_eq!(outcome.solutions[1].get("Successor"), Some("[3, 1, 2]"));
}

#[test]
fn unsatisfiable_log_has_no_solutions() {
    let outcome = parse_log("UNSATISFIABLE\n%%  numberOfConflicts=12\n");

    assert_eq!(outcome.status, RunStatus::Unsatisfiable);
    assert!(outcome.solutions.is_empty());
    assert_eq!(outcome.statistics["numberOfConflicts"], StatValue::Integer(12));
}

#[test]
fn tokens_override_separated_blocks() {
    let log = format!("x = 1;\n{SOLUTION_SEPARATOR}\nUNKNOWN\n");
    let outcome = parse_log(&log);
    assert_eq!(outcome.status, RunStatus::Unknown);
    assert!(outcome.solutions.is_empty());

    let log = format!("x = 1;\n{SOLUTION_SEPARATOR}\nUNKNOWN\nUNSATISFIABLE\n");
    assert_eq!(parse_log(&log).status, RunStatus::Unsatisfiable);
}

#[test]
fn sentinel_marks_optimal_wherever_it_appears() {
    let trailing = format!("x = 1;\n{SOLUTION_SEPARATOR}\n{OPTIMALITY_PROVEN}\n\n  ");
    assert_eq!(parse_log(&trailing).status, RunStatus::Optimal);

    let late_statistics = format!(
        "x = 1;\n%%  objective=3\n{SOLUTION_SEPARATOR}\n{OPTIMALITY_PROVEN}\n%%  numberOfDecisions=3\n"
    );
    let outcome = parse_log(&late_statistics);
    assert!(outcome.optimality_proven);
    assert_eq!(outcome.status, RunStatus::Optimal);
    assert_eq!(outcome.solutions.len(), 1);
    // Statistics come from the last block before the sentinel.
    assert_eq!(outcome.objective(), Some(3));
    assert!(!outcome.statistics.contains_key("numberOfDecisions"));
}

#[test]
fn sentinel_must_stand_on_its_own_line() {
    let log = format!("x = 1;\n{SOLUTION_SEPARATOR}\nlabel = \"{OPTIMALITY_PROVEN}\";\n");
    let outcome = parse_log(&log);
    assert!(!outcome.optimality_proven);
    assert_eq!(outcome.status, RunStatus::Satisfiable);
}

#[test]
fn unterminated_trailing_block_is_not_a_solution() {
    let outcome = parse_log("x = 1;\n----------\nx = 2;\n%%  objective=2\n");
    assert_eq!(outcome.status, RunStatus::Satisfiable);
    assert_eq!(outcome.solutions.len(), 1);
    assert_eq!(outcome.solutions[0].get("x"), Some("1"));
    // Final statistics still come from the trailing text.
    assert_eq!(outcome.objective(), Some(2));
}

#[test]
fn log_without_separator_has_no_solutions() {
    let outcome = parse_log("x = 1;\n%%  objective=5\n");
    assert_eq!(outcome.status, RunStatus::Unknown);
    assert!(outcome.solutions.is_empty());
    assert_eq!(outcome.objective(), Some(5));
}

#[test]
fn empty_log_is_unknown() {
    let outcome = parse_log("");
    assert_eq!(outcome.status, RunStatus::Unknown);
    assert!(outcome.solutions.is_empty());
    assert!(outcome.statistics.is_empty());
}

#[test]
fn parsing_is_deterministic() {
    assert_eq!(parse_log(OPTIMAL_LOG), parse_log(OPTIMAL_LOG));
}

#[test]
fn materialised_solution_parses_back_to_the_same_block() {
    let outcome = parse_log(OPTIMAL_LOG);
    for solution in &outcome.solutions {
        let data = solution.to_data_file();
        assert_eq!(&SolutionBlock::parse_data_file(&data), solution);
    }
}
