//! Heuristic fact mining over free-form agent text.
//!
//! Both extractors are best-effort. Phrasings they do not recognize are
//! silently missed; control flow never depends on them.

use log::warn;
use patchpilot_knowledge::ExtractedEntities;
use patchpilot_protocol::AssessmentStatus;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A VM that the text reports as failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedVmMention {
    pub vm_name: String,
    pub resource_group: Option<String>,
    pub assessment_status: AssessmentStatus,
}

impl FailedVmMention {
    fn failed(vm_name: String, resource_group: Option<String>) -> Self {
        Self {
            vm_name,
            resource_group,
            assessment_status: AssessmentStatus::Failed,
        }
    }
}

const NUMBERED_VM: &str = r"^\d+\.\s+\*\*VM Name:\*\*\s+(.+?)\s*$";
const HEADER_VM: &str = r"^#{2,4}\s+(?:\d+\.\s+)?(?:VM:\s+)?\*?\*?([a-zA-Z0-9][\w\-]+)\*?\*?\s*$";
const RESOURCE_GROUP: &str = r"(?i)Resource Group:\s*([A-Za-z0-9\-_]+)";
const FAILED_STATUS: &str =
    r"(?:-\s+)?\*?\*?(?:Last\s+)?(?:Patch\s+)?Assessment Status:\*?\*?\s+\*\*Failed\*\*";

struct NarrativePatterns {
    numbered_vm: Regex,
    header_vm: Regex,
    resource_group: Regex,
    failed_status: Regex,
}

impl NarrativePatterns {
    fn compile() -> Option<Self> {
        let compile = |pattern: &str| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!("failed to compile extractor pattern (error={})", err);
                None
            }
        };
        Some(Self {
            numbered_vm: compile(NUMBERED_VM)?,
            header_vm: compile(HEADER_VM)?,
            resource_group: compile(RESOURCE_GROUP)?,
            failed_status: compile(FAILED_STATUS)?,
        })
    }
}

fn push_unique(found: &mut Vec<FailedVmMention>, mention: FailedVmMention) {
    if !found.iter().any(|vm| vm.vm_name == mention.vm_name) {
        found.push(mention);
    }
}

/// Pipe-delimited rows whose third cell says `Failed`.
fn scan_table_rows(text: &str, found: &mut Vec<FailedVmMention>) {
    for line in text.split('\n') {
        if !line.contains('|') || !line.contains("Failed") {
            continue;
        }
        if line.contains("---") || line.contains("VM Name") || line.contains("Assessment Status") {
            continue;
        }
        let cells: Vec<&str> = line
            .split('|')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect();
        if cells.len() >= 3 && cells[2].contains("Failed") {
            push_unique(found, FailedVmMention::failed(cells[0].to_string(), None));
        }
    }
}

/// Numbered-list and heading blocks closed by an `Assessment Status: **Failed**` line.
fn scan_narrative(text: &str, found: &mut Vec<FailedVmMention>) {
    let Some(patterns) = NarrativePatterns::compile() else {
        return;
    };
    let mut current_vm: Option<String> = None;
    let mut current_rg: Option<String> = None;

    for line in text.split('\n') {
        if let Some(captures) = patterns.numbered_vm.captures(line) {
            current_vm = captures.get(1).map(|m| m.as_str().trim().to_string());
            current_rg = None;
        }
        if let Some(captures) = patterns.header_vm.captures(line) {
            current_vm = captures.get(1).map(|m| m.as_str().trim().to_string());
            current_rg = None;
        }
        if current_vm.is_some()
            && current_rg.is_none()
            && let Some(captures) = patterns.resource_group.captures(line)
        {
            current_rg = captures.get(1).map(|m| m.as_str().trim().to_string());
        }
        if current_vm.is_some() && patterns.failed_status.is_match(line) {
            if let Some(vm_name) = current_vm.take() {
                push_unique(found, FailedVmMention::failed(vm_name, current_rg.take()));
            }
            current_rg = None;
        }
    }
}

/// Failed VMs mentioned in `text`, table rows first, de-duplicated by name.
pub fn extract_failed_vms(text: &str) -> Vec<FailedVmMention> {
    let mut found = Vec::new();
    scan_table_rows(text, &mut found);
    scan_narrative(text, &mut found);
    found
}

const PATCH_KEYWORDS: &[&str] = &[
    "failed",
    "succeeded",
    "pending",
    "critical",
    "security",
    "reboot",
    "available patches",
];

fn collect_unique(regex: &Regex, text: &str, into: &mut Vec<String>) {
    for captures in regex.captures_iter(text) {
        if let Some(value) = captures.get(1).map(|m| m.as_str().to_string())
            && !into.contains(&value)
        {
            into.push(value);
        }
    }
}

/// Entities recorded alongside a logged response. Matching runs on lower-cased text.
pub fn extract_entities(_query: &str, response: &str) -> ExtractedEntities {
    let text = response.to_lowercase();
    let mut entities = ExtractedEntities::default();

    match Regex::new(r"\b([a-z0-9]+-?[a-z0-9]+(?:patchschedule|schedule|config))\b") {
        Ok(regex) => collect_unique(&regex, &text, &mut entities.maintenance_configs),
        Err(err) => warn!("failed to compile config pattern (error={})", err),
    }
    for pattern in [r"\*\*([a-z0-9-]+server[a-z0-9]*)\*\*", r"vm:\s*([a-z0-9-]+)"] {
        match Regex::new(pattern) {
            Ok(regex) => collect_unique(&regex, &text, &mut entities.vms),
            Err(err) => warn!("failed to compile vm pattern (error={})", err),
        }
    }
    if let Ok(regex) = Regex::new(r"rg-[a-z0-9-]+") {
        entities.resource_group = regex.find(&text).map(|m| m.as_str().to_string());
    }
    if let Ok(regex) =
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
    {
        entities.subscription_id = regex.find(&text).map(|m| m.as_str().to_string());
    }
    entities.patch_keywords = PATCH_KEYWORDS
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .map(|keyword| keyword.to_string())
        .collect();
    entities
}

#[cfg(test)]
mod tests {
    use super::{FailedVmMention, extract_entities, extract_failed_vms};
    use patchpilot_protocol::AssessmentStatus;
    use pretty_assertions::assert_eq;

    fn names(found: &[FailedVmMention]) -> Vec<&str> {
        found.iter().map(|vm| vm.vm_name.as_str()).collect()
    }

    #[test]
    fn table_rows_with_failed_status_cell() {
        let text = "\
| VM Name | Power State | Assessment Status |
|---------|-------------|-------------------|
| web-01 | Running | Failed |
| web-02 | Running | Succeeded |
| db-01 | Failed | Succeeded |
| app-01 | Stopped | **Failed** |";
        let found = extract_failed_vms(text);
        assert_eq!(names(&found), vec!["web-01", "app-01"]);
        assert_eq!(found[0].resource_group, None);
        assert_eq!(found[0].assessment_status, AssessmentStatus::Failed);
    }

    #[test]
    fn numbered_blocks_carry_resource_group() {
        let text = "\
1. **VM Name:** ubuntutestserver
   - Resource Group: rg-patching
   - **Assessment Status:** **Failed**
2. **VM Name:** winserver01
   - Assessment Status: **Succeeded**
3. **VM Name:** centos-box
   - Patch Assessment Status: **Failed**";
        let found = extract_failed_vms(text);
        assert_eq!(names(&found), vec!["ubuntutestserver", "centos-box"]);
        assert_eq!(found[0].resource_group.as_deref(), Some("rg-patching"));
        assert_eq!(found[1].resource_group, None);
    }

    #[test]
    fn heading_blocks_reset_cursor_after_commit() {
        let text = "\
#### 1. VM: **alpha-vm**
- Last Assessment Status: **Failed**
- Assessment Status: **Failed**
### beta-vm
Resource group: RG-Beta
- Assessment Status: **Failed**";
        let found = extract_failed_vms(text);
        assert_eq!(names(&found), vec!["alpha-vm", "beta-vm"]);
        assert_eq!(found[1].resource_group.as_deref(), Some("RG-Beta"));
    }

    #[test]
    fn union_is_duplicate_free_and_idempotent() {
        let text = "\
| web-01 | Running | Failed |
1. **VM Name:** web-01
   - Assessment Status: **Failed**
2. **VM Name:** web-02
   - Assessment Status: **Failed**";
        let first = extract_failed_vms(text);
        assert_eq!(names(&first), vec!["web-01", "web-02"]);
        assert_eq!(extract_failed_vms(text), first);
    }

    #[test]
    fn unrecognized_phrasing_yields_nothing() {
        assert_eq!(
            extract_failed_vms("The VM web-01 failed its last assessment."),
            Vec::new()
        );
    }

    #[test]
    fn entities_are_mined_from_lowercased_response() {
        let response = "Config WeeklyPatchSchedule covers **UbuntuTestServer** and VM: Web-01 \
in RG-Prod-East under subscription 0A1B2C3D-1111-2222-3333-444455556666. \
Status: Failed, reboot pending, 3 Available Patches.";
        let entities = extract_entities("status?", response);
        assert_eq!(entities.maintenance_configs, vec!["weeklypatchschedule"]);
        assert_eq!(entities.vms, vec!["ubuntutestserver", "web-01"]);
        assert_eq!(entities.resource_group.as_deref(), Some("rg-prod-east"));
        assert_eq!(
            entities.subscription_id.as_deref(),
            Some("0a1b2c3d-1111-2222-3333-444455556666")
        );
        assert_eq!(
            entities.patch_keywords,
            vec!["failed", "pending", "reboot", "available patches"]
        );
    }
}
