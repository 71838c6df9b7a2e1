//! Prompt construction with provenance bookkeeping.
//!
//! Rendering is a strategy: the host may supply a renderer that delegates to
//! a remote rendering service, and [`FallbackRenderer`] tries it first and
//! falls back to local static templates on error so prompt delivery is never
//! blocked. Every rendered prompt carries a [`ProvenanceRecord`] describing
//! how it was produced; fallback output is marked as synthesized.

use async_trait::async_trait;
use tracing::{debug, warn};
use wild_proto::{
    Alert, PromptRenderer, PromptType, ProvenanceRecord, RenderRequest, Result, Run,
};

/// Renders prompts from built-in static templates.
///
/// This is the local fallback for the remote rendering service; its output
/// is always marked as synthesized.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticTemplateRenderer;

impl StaticTemplateRenderer {
    fn template(prompt_type: PromptType) -> &'static str {
        match prompt_type {
            PromptType::Exploring => {
                "You are driving an autonomous experiment loop.\n\n\
                 Goal: {goal}\n\
                 Iteration: {iteration}\n\n\
                 Explore the problem: inspect prior results, refine hypotheses, and \
                 decide the next experiment. When you are ready to launch a sweep, \
                 emit a <job>{...}</job> block with name, base_command, parameters, \
                 and max_runs. If the goal is met, reply with \
                 <signal>COMPLETE</signal>. If you need a human decision, reply with \
                 <signal>NEEDS_HUMAN</signal>. Otherwise summarize your findings and \
                 reply with <signal>CONTINUE</signal>."
            }
            PromptType::Analysis => {
                "The sweep for goal \"{goal}\" has finished.\n\n\
                 Results: {succeeded} run(s) succeeded, {failed} run(s) failed.\n\n\
                 Analyze the results against the goal. If the goal is met, reply \
                 with <signal>COMPLETE</signal>. If a human should review before \
                 continuing, reply with <signal>NEEDS_HUMAN</signal>. Otherwise \
                 reply with <signal>CONTINUE</signal> and the next direction to \
                 explore."
            }
            PromptType::Alert => {
                "An alert fired while monitoring the sweep for goal \"{goal}\".\n\n\
                 Run: {run_name}\n\
                 Alert: {message}\n\
                 Choices: {choices}\n\n\
                 Decide how to respond. Emit a \
                 <resolve_alert>{\"alert_id\": \"{alert_id}\", \"choice\": ...}</resolve_alert> \
                 block with one of the listed choices, or reply with \
                 <signal>NEEDS_HUMAN</signal> if none is safe."
            }
            PromptType::RunEvent => {
                "A run in the sweep for goal \"{goal}\" finished.\n\n\
                 Run: {run_name} ({status})\n\
                 Batch: {summary}\n\n\
                 Log tail:\n{log_tail}\n\n\
                 Note anything relevant to the goal. The loop keeps monitoring the \
                 remaining runs."
            }
        }
    }
}

#[async_trait]
impl PromptRenderer for StaticTemplateRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<ProvenanceRecord> {
        let template = Self::template(request.prompt_type);
        let mut rendered = template.replace("{goal}", &request.goal);
        for (key, value) in &request.variables {
            rendered = rendered.replace(&format!("{{{key}}}"), value);
        }
        Ok(ProvenanceRecord {
            rendered,
            user_input: request.goal.clone(),
            skill_id: None,
            skill_name: None,
            template: template.to_string(),
            variables: request.variables.clone(),
            prompt_type: request.prompt_type,
            synthesized: true,
        })
    }
}

/// Tries a primary renderer and falls back to static templates on error.
pub struct FallbackRenderer {
    primary: Box<dyn PromptRenderer>,
    fallback: StaticTemplateRenderer,
}

impl FallbackRenderer {
    pub fn new(primary: Box<dyn PromptRenderer>) -> Self {
        Self {
            primary,
            fallback: StaticTemplateRenderer,
        }
    }
}

#[async_trait]
impl PromptRenderer for FallbackRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<ProvenanceRecord> {
        match self.primary.render(request).await {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!(
                    error = %e,
                    prompt_type = request.prompt_type.as_str(),
                    "Prompt rendering failed, using static template"
                );
                let mut record = self.fallback.render(request).await?;
                record.synthesized = true;
                Ok(record)
            }
        }
    }
}

/// Produces the literal prompt text plus a record of how it was produced.
pub struct PromptBuilder {
    renderer: Box<dyn PromptRenderer>,
}

impl PromptBuilder {
    /// Uses the given renderer as-is.
    pub fn new(renderer: Box<dyn PromptRenderer>) -> Self {
        Self { renderer }
    }

    /// Static-template-only builder, for hosts without a rendering service.
    pub fn local() -> Self {
        Self::new(Box::new(StaticTemplateRenderer))
    }

    /// Delegates to `remote` and falls back to static templates on error.
    pub fn with_remote(remote: Box<dyn PromptRenderer>) -> Self {
        Self::new(Box::new(FallbackRenderer::new(remote)))
    }

    /// Renders a request, degrading to a static template with no provenance
    /// if the renderer itself fails.
    async fn build(&self, request: RenderRequest) -> (String, Option<ProvenanceRecord>) {
        match self.renderer.render(&request).await {
            Ok(record) => (record.rendered.clone(), Some(record)),
            Err(e) => {
                warn!(
                    error = %e,
                    prompt_type = request.prompt_type.as_str(),
                    "Renderer failed with no usable fallback, synthesizing prompt"
                );
                // StaticTemplateRenderer cannot fail; the provenance is
                // omitted so consumers see this prompt was not traced.
                let text = match StaticTemplateRenderer.render(&request).await {
                    Ok(record) => record.rendered,
                    Err(_) => request.goal.clone(),
                };
                (text, None)
            }
        }
    }

    /// Builds the exploring prompt for the given iteration.
    pub async fn exploring(
        &self,
        goal: &str,
        iteration: u64,
    ) -> (String, Option<ProvenanceRecord>) {
        debug!(iteration, "Building exploring prompt");
        let request = RenderRequest::new(PromptType::Exploring, goal)
            .with_variable("iteration", iteration.to_string());
        self.build(request).await
    }

    /// Builds the analysis prompt summarizing pass/fail counts.
    pub async fn analysis(
        &self,
        goal: &str,
        succeeded: usize,
        failed: usize,
    ) -> (String, Option<ProvenanceRecord>) {
        let request = RenderRequest::new(PromptType::Analysis, goal)
            .with_variable("succeeded", succeeded.to_string())
            .with_variable("failed", failed.to_string());
        self.build(request).await
    }

    /// Builds the prompt for a pending alert on a run.
    pub async fn alert(
        &self,
        goal: &str,
        alert: &Alert,
        run_name: &str,
    ) -> (String, Option<ProvenanceRecord>) {
        let request = RenderRequest::new(PromptType::Alert, goal)
            .with_variable("alert_id", alert.id.clone())
            .with_variable("run_name", run_name.to_string())
            .with_variable("message", alert.message.clone())
            .with_variable("choices", alert.choices.join(", "));
        self.build(request).await
    }

    /// Builds the prompt reporting a run that just reached a terminal state.
    pub async fn run_event(
        &self,
        goal: &str,
        run: &Run,
        summary: &str,
        log_tail: &str,
    ) -> (String, Option<ProvenanceRecord>) {
        let request = RenderRequest::new(PromptType::RunEvent, goal)
            .with_variable("run_name", run.name.clone())
            .with_variable("status", run.status.as_str().to_string())
            .with_variable("summary", summary.to_string())
            .with_variable("log_tail", log_tail.to_string());
        self.build(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wild_proto::Error;

    struct FailingRenderer;

    #[async_trait]
    impl PromptRenderer for FailingRenderer {
        async fn render(&self, _request: &RenderRequest) -> Result<ProvenanceRecord> {
            Err(Error::render("service unavailable"))
        }
    }

    struct TracingRenderer;

    #[async_trait]
    impl PromptRenderer for TracingRenderer {
        async fn render(&self, request: &RenderRequest) -> Result<ProvenanceRecord> {
            Ok(ProvenanceRecord {
                rendered: format!("remote: {}", request.goal),
                user_input: request.goal.clone(),
                skill_id: Some("skill-9".to_string()),
                skill_name: Some("Sweep explorer".to_string()),
                template: "remote-template".to_string(),
                variables: request.variables.clone(),
                prompt_type: request.prompt_type,
                synthesized: false,
            })
        }
    }

    #[tokio::test]
    async fn test_static_renderer_substitutes_variables() {
        let (text, provenance) = PromptBuilder::local().exploring("find best lr", 3).await;
        assert!(text.contains("find best lr"));
        assert!(text.contains("Iteration: 3"));

        let record = provenance.unwrap();
        assert!(record.synthesized);
        assert_eq!(record.user_input, "find best lr");
        assert_eq!(record.variables.get("iteration").unwrap(), "3");
    }

    #[tokio::test]
    async fn test_remote_renderer_provenance_is_traced() {
        let builder = PromptBuilder::with_remote(Box::new(TracingRenderer));
        let (text, provenance) = builder.exploring("find best lr", 1).await;
        assert_eq!(text, "remote: find best lr");

        let record = provenance.unwrap();
        assert!(!record.synthesized);
        assert_eq!(record.skill_id.as_deref(), Some("skill-9"));
    }

    #[tokio::test]
    async fn test_fallback_on_remote_failure_marks_synthesized() {
        let builder = PromptBuilder::with_remote(Box::new(FailingRenderer));
        let (text, provenance) = builder.analysis("find best lr", 4, 1).await;
        assert!(text.contains("4 run(s) succeeded"));
        assert!(text.contains("1 run(s) failed"));
        assert!(provenance.unwrap().synthesized);
    }

    #[tokio::test]
    async fn test_bare_failing_renderer_omits_provenance() {
        let builder = PromptBuilder::new(Box::new(FailingRenderer));
        let (text, provenance) = builder.exploring("find best lr", 1).await;
        assert!(text.contains("find best lr"));
        assert!(provenance.is_none());
    }
}
