//! Integration coverage for `epicbox::classify` through the public
//! API, combining a communicator outcome with inspected container
//! state the way `lifecycle::start` actually does.

use epicbox::classify::{classify, InspectedState};
use epicbox::communicator::CommunicatorOutcome;

#[test]
fn timed_out_outcome_never_reaches_inspect() {
    let result = classify(CommunicatorOutcome::TimedOut, None);
    assert_eq!(result.exit_code, None);
    assert!(result.timeout);
    assert!(result.stdout.is_empty());
}

#[test]
fn completed_outcome_without_an_inspect_result_falls_back_to_defaults() {
    let outcome = CommunicatorOutcome::Completed {
        stdout: b"ok\n".to_vec(),
        stderr: Vec::new(),
    };
    let result = classify(outcome, None);
    assert_eq!(result.exit_code, None);
    assert!(!result.timeout);
    assert_eq!(result.stdout, b"ok\n");
}

#[test]
fn completed_outcome_with_oom_flag_set_is_not_misclassified_as_timeout() {
    let outcome = CommunicatorOutcome::Completed {
        stdout: Vec::new(),
        stderr: b"killed\n".to_vec(),
    };
    let inspected = InspectedState {
        exit_code: Some(137),
        started_at: None,
        finished_at: None,
        oom_killed: true,
    };
    let result = classify(outcome, Some(inspected));
    assert!(result.oom_killed);
    assert!(!result.timeout);
    assert_eq!(result.stderr, b"killed\n");
}
