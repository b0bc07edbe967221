use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};

/// Serialize as pretty JSON with 2-space indentation and sorted object keys.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    // serde_json::Value keeps object keys ordered.
    let value = serde_json::to_value(value)?;
    serde_json::to_string_pretty(&value)
}

pub struct JsonOutput;

impl JsonOutput {
    /// Print `value` to stdout followed by a newline.
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = to_pretty_json(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress sink that reports through the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        tracing::info!("{}", event.message);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn keys_are_sorted() {
        let mut value = HashMap::new();
        value.insert("zeta", 1);
        value.insert("alpha", 2);
        let json = to_pretty_json(&value).unwrap();
        assert_eq!(json, "{\n  \"alpha\": 2,\n  \"zeta\": 1\n}");
    }
}
