use serde_json::Value;

use crate::{
    Config, Document, Error, Result,
    matcher::matches,
    monitoring::{CommandStartedEvent, normalize},
    scenario::Outcome,
    spec_file::ExpectedOutcome,
};

/// Check a scenario's outcome and recorded commands against its expectations.
///
/// The outcome is checked first, then every expected event in order against
/// the event recorded at the same position. The first violation is returned.
/// Recorded events beyond the expected ones are ignored.
pub fn verify(
    outcome: &Outcome,
    recorded: &[CommandStartedEvent],
    expected: &ExpectedOutcome,
    expected_events: &[Document],
    config: &Config,
) -> Result {
    match (expected, outcome) {
        (ExpectedOutcome::Failure(_), Ok(changes)) => {
            tracing::debug!(changes = changes.len(), "expected error but got success");
            return Err(Error::UnexpectedSuccess);
        }
        (ExpectedOutcome::Failure(shape), Err(e)) => {
            compare(&e.to_value(), shape, config, "error")?;
        }
        (ExpectedOutcome::Success(_), Err(e)) => return Err(Error::Store(e.clone())),
        (ExpectedOutcome::Success(shape), Ok(changes)) => {
            let actual = Value::Array(changes.clone());
            let shape = Value::Array(shape.clone());
            compare(&actual, &shape, config, "result")?;
        }
    }

    for (idx, expected_event) in expected_events.iter().enumerate() {
        let Some(event) = recorded.get(idx) else {
            return Err(Error::MissingEvent(idx));
        };
        let actual = Value::Object(normalize(&event.to_document()));
        let expected = Value::Object(normalize(expected_event));
        compare(&actual, &expected, config, "event").inspect_err(|_| {
            tracing::debug!(index = idx, command = %event.command_name, "event mismatch");
        })?;
    }
    Ok(())
}

fn compare(actual: &Value, expected: &Value, config: &Config, what: &'static str) -> Result {
    matches(Some(actual), expected).map_err(|e| {
        if config.log_mismatch_values() {
            tracing::debug!(what, %actual, %expected, "value mismatch");
        }
        Error::Mismatch(e)
    })
}
