//! JavaScript evaluation methods.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{Command, RuntimeCommand, is_truthy};
use crate::transport::Transport;

use super::core::Session;

// ============================================================================
// Session - Script Evaluation
// ============================================================================

impl<T: Transport> Session<T> {
    /// Evaluates an expression in the page and returns its value.
    ///
    /// An `undefined` result is returned as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if the evaluation fails or the expression
    /// throws.
    pub async fn execute_javascript(&mut self, expression: &str) -> Result<Value> {
        debug!(expression_len = expression.len(), "Evaluating expression");

        let response = self
            .send_command(Command::Runtime(RuntimeCommand::Evaluate {
                expression: expression.to_string(),
                return_by_value: true,
            }))
            .await?;

        if let Some(fault) = response.error {
            return Err(Error::script(fault.message));
        }

        let result = response.result.unwrap_or(Value::Null);
        let remote = result.get("result").cloned().unwrap_or(Value::Null);

        let thrown = result
            .get("wasThrown")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if thrown || result.get("exceptionDetails").is_some() {
            return Err(Error::script(exception_message(&result, &remote)));
        }

        if remote.get("type").and_then(Value::as_str) == Some("undefined") {
            return Ok(Value::Null);
        }

        Ok(remote.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Re-evaluates `expression` every `interval` until its value is set.
    ///
    /// Returns the first value that is set. `null`, `false`, `0`, `""`, `[]`
    /// and `{}` count as unset, so an empty array keeps polling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Script`] if an evaluation fails.
    pub async fn poll_for_javascript_expression(
        &mut self,
        expression: &str,
        interval: Duration,
    ) -> Result<Value> {
        let started = Instant::now();

        loop {
            let value = self.execute_javascript(expression).await?;
            if is_truthy(&value) {
                return Ok(value);
            }

            info!(
                expression,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Polling for expression"
            );
            tokio::time::sleep(interval).await;
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Picks the most descriptive message of a thrown evaluation.
fn exception_message(result: &Value, remote: &Value) -> String {
    let details = result.get("exceptionDetails");

    details
        .and_then(|d| d.get("exception"))
        .and_then(|e| e.get("description"))
        .or_else(|| remote.get("description"))
        .or_else(|| details.and_then(|d| d.get("text")))
        .and_then(Value::as_str)
        .unwrap_or("Expression threw")
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::Response;
    use crate::session::SessionOptions;
    use crate::transport::ReplayTransport;

    fn evaluates(results: &[Value]) -> Session<ReplayTransport> {
        let transport = results.iter().fold(ReplayTransport::new(), |t, r| {
            t.with_result("Runtime.evaluate", r.clone())
        });
        Session::with_transport(transport, SessionOptions::default())
    }

    fn number(n: i64) -> Value {
        json!({"result": {"type": "number", "value": n, "description": n.to_string()}})
    }

    #[tokio::test]
    async fn test_returns_value() {
        let mut session = evaluates(&[number(2)]);

        let value = session.execute_javascript("1 + 1").await.expect("evaluate");
        assert_eq!(value, json!(2));

        let sent = &session.transport().expect("open").sent()[0];
        assert_eq!(
            sent.command.params(),
            json!({"expression": "1 + 1", "returnByValue": true})
        );
    }

    #[tokio::test]
    async fn test_undefined_is_null() {
        let mut session = evaluates(&[json!({"result": {"type": "undefined"}})]);
        let value = session.execute_javascript("void 0").await.expect("evaluate");
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_thrown_expression_fails() {
        let mut session = evaluates(&[json!({
            "result": {"type": "object", "subtype": "error"},
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": {"description": "ReferenceError: foo is not defined"}
            }
        })]);

        let err = session.execute_javascript("foo").await.expect_err("thrown");
        assert!(matches!(err, Error::Script { .. }));
        assert!(err.to_string().contains("ReferenceError"));
    }

    #[tokio::test]
    async fn test_was_thrown_uses_description() {
        let mut session = evaluates(&[json!({
            "result": {"type": "object", "description": "Error: boom"},
            "wasThrown": true
        })]);

        let err = session.execute_javascript("boom()").await.expect_err("thrown");
        assert!(err.to_string().contains("Error: boom"));
    }

    #[tokio::test]
    async fn test_error_response_fails() {
        let transport = ReplayTransport::new()
            .with_response("Runtime.evaluate", Response::failure(None, "Cannot find context"));
        let mut session = Session::with_transport(transport, SessionOptions::default());

        let err = session.execute_javascript("1").await.expect_err("fault");
        assert!(matches!(err, Error::Script { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_truthy() {
        let mut session = evaluates(&[
            json!({"result": {"type": "boolean", "value": false}}),
            number(0),
            json!({"result": {"type": "string", "value": "complete"}}),
        ]);

        let started = Instant::now();
        let value = session
            .poll_for_javascript_expression("document.readyState", Duration::from_millis(500))
            .await
            .expect("poll");

        assert_eq!(value, json!("complete"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1500));
        assert_eq!(session.transport().expect("open").count("Runtime.evaluate"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_skips_empty_containers() {
        let mut session = evaluates(&[
            json!({"result": {"type": "object", "value": []}}),
            json!({"result": {"type": "object", "value": {}}}),
            json!({"result": {"type": "object", "value": ["img-1"]}}),
        ]);

        let value = session
            .poll_for_javascript_expression("window.loaded", Duration::from_millis(100))
            .await
            .expect("poll");

        assert_eq!(value, json!(["img-1"]));
        assert_eq!(session.transport().expect("open").count("Runtime.evaluate"), 3);
    }
}
