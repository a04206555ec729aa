//! Rendering results for the terminal

use anyhow::Result;
use esadmin::{Completion, OperationResult};
use serde::Serialize;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print a mutation outcome; exit status follows `accepted`
    pub fn report(&self, action: &str, result: &OperationResult) -> Result<ExitCode> {
        if self.json {
            self.json(result)?;
        } else if result.accepted {
            println!("{}: {}", action, describe(result));
            if let Some(ref partial) = result.partial {
                for (index, error) in &partial.failed {
                    eprintln!("  {} failed: {}", index, error);
                }
            }
            if let Some(ref reason) = result.reason {
                eprintln!("  {}", reason);
            }
        } else {
            eprintln!(
                "{} refused: {}",
                action,
                result.reason.as_deref().unwrap_or("no reason given")
            );
        }

        Ok(if result.accepted {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

fn describe(result: &OperationResult) -> &'static str {
    match result.completion {
        Some(Completion::Completed) => "done",
        Some(Completion::TimedOut) => "issued, still in progress",
        Some(Completion::ShardVanished) => "issued, shard vanished",
        Some(Completion::Cancelled) => "issued, no longer watching",
        None if result.partial.as_ref().is_some_and(|p| !p.is_clean()) => "partially applied",
        None => "done",
    }
}

/// Human-readable size, binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esadmin::PartialFailure;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&OperationResult::accepted()), "done");
        assert_eq!(
            describe(&OperationResult::accepted().with_completion(Completion::TimedOut)),
            "issued, still in progress"
        );

        let mut partial = PartialFailure::default();
        partial.failed.insert("b".to_string(), "HTTP 500".to_string());
        assert_eq!(
            describe(&OperationResult::accepted().with_partial(partial)),
            "partially applied"
        );
    }
}
