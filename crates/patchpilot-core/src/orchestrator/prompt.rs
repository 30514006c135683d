//! Natural-language prompts sent to the agent during a run.

/// Phase-1 audit prompt; the configuration name takes precedence over scope.
pub fn patch_status_prompt(
    subscription_id: &str,
    resource_group: Option<&str>,
    configuration_name: Option<&str>,
) -> String {
    let mut prompt = String::from("Show me the patch assessment status for all VMs");
    match configuration_name {
        Some(configuration) => {
            prompt.push_str(&format!(" in {configuration} maintenance configuration"));
        }
        None => {
            prompt.push_str(&format!(" in subscription {subscription_id}"));
            if let Some(resource_group) = resource_group {
                prompt.push_str(&format!(" in resource group {resource_group}"));
            }
        }
    }
    prompt
}

/// Query recorded for a finished run.
pub fn orchestration_log_query(
    subscription_id: &str,
    resource_group: Option<&str>,
    configuration_name: Option<&str>,
) -> String {
    format!(
        "Multi-agent orchestration: {}/{}/{}",
        subscription_id,
        resource_group.unwrap_or("None"),
        configuration_name.unwrap_or("None")
    )
}
