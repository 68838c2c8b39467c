//! Prompts sent to the model.

use handlebars::Handlebars;
use sentinel::LogRecord;
use serde::Serialize;

use crate::error::BackendResult;

const USER_TEMPLATE_NAME: &str = "analyze";

/// SRE persona and the remediation tool catalog.
pub const SYSTEM_PROMPT: &str = r#"You are a Kubernetes Site Reliability Engineer (SRE) AI assistant.
Your job is to analyze Kubernetes logs and propose the most appropriate remediation action.

## Available Tools

1. **scale_deployment** - Scale deployment replicas up or down
   Parameters: namespace, deployment, replicas
   Use when: OOMKilled, high traffic, CPU pressure, load balancing needed

2. **restart_pod** - Restart a specific pod (delete and recreate)
   Parameters: namespace, pod, graceful (bool)
   Use when: Pod stuck, memory leak, unresponsive app, needs config refresh

3. **rollback_deployment** - Rollback to previous deployment version
   Parameters: namespace, deployment, revision (optional)
   Use when: Bad deployment, app errors after update, performance regression

4. **drain_node** - Safely evict all pods from a node
   Parameters: node, force (bool), ignore_daemonsets (bool), timeout
   Use when: Node hardware issues, maintenance needed, OS updates

5. **cordon_node** - Mark node as unschedulable
   Parameters: node, cordon (bool - true to cordon, false to uncordon)
   Use when: Prevent new pods on problematic node, gradual drain

6. **delete_pod** - Force delete a stuck pod
   Parameters: namespace, pod, force (bool)
   Use when: Pod stuck in Terminating, zombie pods, cleanup needed

7. **update_resource_limits** - Update CPU/Memory limits
   Parameters: namespace, deployment, cpu_limit, memory_limit, cpu_request, memory_request
   Use when: OOMKilled frequently, CPU throttling, resource optimization

8. **apply_network_policy** - Apply network traffic rules
   Parameters: namespace, policy_name, action (allow/deny), target_pod_selector
   Use when: Security incident, DDoS, traffic isolation needed

## Response Format

Respond with a JSON object:
{
  "toolName": "<tool_name>",
  "args": { <tool-specific parameters> },
  "reason": "<detailed explanation of the issue and why this action will fix it>"
}

## Rules
- Analyze ALL logs to understand the full context
- Choose the MOST appropriate tool for the specific issue
- Extract deployment/pod names from the log entries
- Provide detailed reasoning explaining root cause and fix
- namespace defaults to "prod" unless logs indicate otherwise"#;

const USER_TEMPLATE: &str = r"Analyze these Kubernetes log entries. A critical incident has been detected.

LOGS:
{{logs}}

Based on these logs:
1. Identify the root cause of the incident
2. Choose the most appropriate remediation tool
3. Provide the complete JSON response with toolName, args, and detailed reason";

#[derive(Serialize)]
struct UserContext {
    logs: String,
}

/// Renders the per-request user prompt.
pub struct PromptBuilder {
    handlebars: Handlebars<'static>,
}

impl PromptBuilder {
    pub fn new() -> BackendResult<Self> {
        let mut handlebars = Handlebars::new();
        // Log lines are plain text; HTML escaping would mangle quotes.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);
        handlebars.register_template_string(USER_TEMPLATE_NAME, USER_TEMPLATE)?;
        Ok(Self { handlebars })
    }

    /// User prompt for `logs`, one formatted line per record.
    pub fn user_prompt(&self, logs: &[LogRecord]) -> BackendResult<String> {
        let context = UserContext {
            logs: format_logs(logs),
        };
        Ok(self.handlebars.render(USER_TEMPLATE_NAME, &context)?)
    }
}

/// `[timestamp] [LEVEL] [pod] message`, newline separated.
pub fn format_logs(logs: &[LogRecord]) -> String {
    logs.iter()
        .map(LogRecord::format_line)
        .collect::<Vec<_>>()
        .join("\n")
}
