//! Extraction of structured directives from agent response text.
//!
//! Three block forms are recognized anywhere in a response:
//! ```text
//! <signal>CONTINUE|COMPLETE|NEEDS_HUMAN</signal>   (legacy alias: <promise>)
//! <job>{"name": ..., "base_command": ..., "parameters": ..., "max_runs": ...}</job>
//! <resolve_alert>{"alert_id": ..., "choice": ...}</resolve_alert>
//! ```
//!
//! All parsers are pure functions. Malformed blocks yield `None` rather than
//! errors; the controller treats that as "no directive found".

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use wild_proto::JobSpec;

/// A directive embedded in agent output that ends or redirects the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    /// Keep going in the current stage.
    Continue,
    /// The goal is met; the loop should stop.
    Complete,
    /// A human needs to intervene; the loop should pause.
    NeedsHuman,
}

/// An alert-resolution directive naming the choice to submit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertResolution {
    pub alert_id: String,
    pub choice: String,
}

fn signal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"<signal>\s*(CONTINUE|COMPLETE|NEEDS_HUMAN)\s*</signal>|<promise>\s*(CONTINUE|COMPLETE|NEEDS_HUMAN)\s*</promise>",
        )
        .expect("hard-coded signal pattern")
    })
}

/// Parses the first signal tag found in the response, if any.
pub fn parse_signal(response: &str) -> Option<LoopSignal> {
    let captures = signal_regex().captures(response)?;
    let token = captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())?;
    match token {
        "CONTINUE" => Some(LoopSignal::Continue),
        "COMPLETE" => Some(LoopSignal::Complete),
        "NEEDS_HUMAN" => Some(LoopSignal::NeedsHuman),
        _ => None,
    }
}

/// Parses a `<job>` specification block, if one is present and well-formed.
pub fn parse_job_spec(response: &str) -> Option<JobSpec> {
    let payload = extract_block(response, "job")?;
    serde_json::from_str(payload.trim()).ok()
}

/// Parses a `<resolve_alert>` directive, if one is present and well-formed.
pub fn parse_alert_resolution(response: &str) -> Option<AlertResolution> {
    let payload = extract_block(response, "resolve_alert")?;
    serde_json::from_str(payload.trim()).ok()
}

/// Extracts the text between the first `<tag>` and its closing `</tag>`.
fn extract_block<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(&text[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal_variants() {
        assert_eq!(
            parse_signal("done <signal>COMPLETE</signal>"),
            Some(LoopSignal::Complete)
        );
        assert_eq!(
            parse_signal("<signal>CONTINUE</signal>"),
            Some(LoopSignal::Continue)
        );
        assert_eq!(
            parse_signal("stuck\n<signal> NEEDS_HUMAN </signal>"),
            Some(LoopSignal::NeedsHuman)
        );
    }

    #[test]
    fn test_parse_signal_legacy_promise_alias() {
        assert_eq!(
            parse_signal("<promise>COMPLETE</promise>"),
            Some(LoopSignal::Complete)
        );
    }

    #[test]
    fn test_parse_signal_absent_or_unknown() {
        assert_eq!(parse_signal("no directives here"), None);
        assert_eq!(parse_signal("<signal>MAYBE</signal>"), None);
        // Mismatched tag pair is not a signal.
        assert_eq!(parse_signal("<signal>COMPLETE</promise>"), None);
    }

    #[test]
    fn test_parse_job_spec() {
        let response = r#"Let's sweep the learning rate.
<job>{"name": "lr-sweep", "base_command": "python train.py", "parameters": {"lr": [0.001, 0.01, 0.1]}, "max_runs": 3}</job>
"#;
        let spec = parse_job_spec(response).unwrap();
        assert_eq!(spec.name, "lr-sweep");
        assert_eq!(spec.base_command, "python train.py");
        assert_eq!(spec.max_runs, Some(3));
        assert!(spec.parameters.contains_key("lr"));
    }

    #[test]
    fn test_parse_job_spec_defaults() {
        let spec =
            parse_job_spec(r#"<job>{"name": "solo", "base_command": "python eval.py"}</job>"#)
                .unwrap();
        assert!(spec.parameters.is_empty());
        assert_eq!(spec.max_runs, None);
    }

    #[test]
    fn test_malformed_job_spec_yields_none() {
        assert_eq!(parse_job_spec("<job>{not json}</job>"), None);
        assert_eq!(parse_job_spec(r#"<job>{"name": "x"}</job>"#), None);
        assert_eq!(parse_job_spec("<job>unclosed"), None);
        assert_eq!(parse_job_spec("no block at all"), None);
    }

    #[test]
    fn test_parse_alert_resolution() {
        let response =
            r#"<resolve_alert>{"alert_id": "alert-7", "choice": "restart"}</resolve_alert>"#;
        let resolution = parse_alert_resolution(response).unwrap();
        assert_eq!(resolution.alert_id, "alert-7");
        assert_eq!(resolution.choice, "restart");
    }

    #[test]
    fn test_malformed_alert_resolution_yields_none() {
        assert_eq!(
            parse_alert_resolution("<resolve_alert>oops</resolve_alert>"),
            None
        );
        assert_eq!(parse_alert_resolution(""), None);
    }

    #[test]
    fn test_signal_and_job_can_coexist() {
        let response = r#"<signal>CONTINUE</signal>
<job>{"name": "s", "base_command": "python train.py"}</job>"#;
        assert_eq!(parse_signal(response), Some(LoopSignal::Continue));
        assert!(parse_job_spec(response).is_some());
    }
}
