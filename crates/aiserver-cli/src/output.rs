//! JSON output helpers for CLI commands.

use aiserver_engine::Envelope;
use serde::Serialize;

/// Renders `value` as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Prints `value` as one line of JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
#[allow(clippy::print_stdout)]
pub fn print_line<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Prints an envelope and returns whether it reports success.
///
/// # Errors
///
/// Returns an error if serialization fails.
#[allow(clippy::print_stdout)]
pub fn print_envelope<T: Serialize>(envelope: &Envelope<T>) -> anyhow::Result<bool> {
    println!("{}", render(envelope)?);
    Ok(envelope.success)
}

#[cfg(test)]
mod tests {
    use aiserver_common::error::OrchestratorError;

    use super::*;

    #[test]
    fn failure_envelope_renders_code() {
        let err = OrchestratorError::InUse {
            module: "redis".into(),
            dependents: vec!["n8n".into()],
        };
        let rendered = render(&Envelope::<()>::error(&err)).expect("render");
        assert!(rendered.contains("\"code\": \"E_IN_USE\""), "got: {rendered}");
        assert!(rendered.contains("redis is in use by n8n"), "got: {rendered}");
        assert!(!rendered.contains("data"));
    }

    #[test]
    fn success_envelope_renders_data() {
        let rendered = render(&Envelope::ok(vec!["a"])).expect("render");
        assert!(rendered.contains("\"success\": true"));
        assert!(rendered.contains("\"a\""));
    }
}
