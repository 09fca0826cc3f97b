//! Tests for the error taxonomy

use std::time::Duration;

use prometheus_fleet::core::{EngineError, TerminalFailure, WorkerAccount};

#[test]
fn display_strings_are_stable() {
    let err = EngineError::Transient("socket hangup".into());
    assert_eq!(format!("{err}"), "transient task failure: socket hangup");

    let err = EngineError::Timeout(Duration::from_millis(250));
    assert_eq!(format!("{err}"), "task timed out after 250ms");

    let err = EngineError::FatalRunner { failed: 4 };
    assert_eq!(
        format!("{err}"),
        "error limit reached after 4 terminal task failures"
    );

    let err = EngineError::AcquisitionExhausted;
    assert_eq!(format!("{err}"), "no eligible resource available to claim");

    let err = EngineError::PoolClosed;
    assert_eq!(format!("{err}"), "pool is shut down");
}

#[test]
fn auth_rejection_is_detectable() {
    assert!(EngineError::AuthRejected.is_auth_rejection());
    assert!(!EngineError::Transient("nope".into()).is_auth_rejection());
}

#[test]
fn terminal_failure_converts_and_carries_account() {
    let account = WorkerAccount::new("ghost", "retail");
    let id = account.id;
    let err: EngineError = TerminalFailure {
        last_account: Some(account),
    }
    .into();
    match err {
        EngineError::Terminal(failure) => {
            assert_eq!(failure.last_account.unwrap().id, id);
        }
        other => panic!("unexpected variant: {other}"),
    }
}
