//! Assertions on failed queue operations

use super::QueueError;
use crate::QueueResult;

/// Unwrap the error of a queue operation that should have failed
#[track_caller]
pub fn expect_queue_error<T>(result: QueueResult<T>) -> QueueError {
    match result {
        Err(err) => err,
        Ok(_) => panic!("queue operation succeeded, an error was expected"),
    }
}

#[track_caller]
pub fn assert_error_code<T>(result: QueueResult<T>, code: &str) {
    let err = expect_queue_error(result);
    assert_eq!(err.code(), code, "unexpected error: {err}");
}

#[track_caller]
pub fn assert_error_contains<T>(result: QueueResult<T>, fragment: &str) {
    let message = expect_queue_error(result).to_string();
    assert!(message.contains(fragment), "'{message}' lacks '{fragment}'");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vetoed() -> QueueResult<()> {
        Err(QueueError::VetoedInsert {
            entity: "Order".to_string(),
            id: "7".to_string(),
        })
    }

    #[test]
    fn test_helpers_accept_matching_failure() {
        assert_error_code(vetoed(), "AQ002");
        assert_error_contains(vetoed(), "Order#7");
    }

    #[test]
    #[should_panic(expected = "an error was expected")]
    fn test_success_is_rejected() {
        assert_error_code(Ok::<_, QueueError>(1), "AQ002");
    }
}
