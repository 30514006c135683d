//! Maintenance configurations and their VM assignments.

use serde::{Deserialize, Serialize};

/// A scheduled maintenance configuration as reported by the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MaintenanceConfiguration {
    /// Full resource id; the resource group is its fifth segment.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub maintenance_scope: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub expiration_date_time: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub recur_every: Option<String>,
    #[serde(default)]
    pub reboot_setting: Option<String>,
}

impl MaintenanceConfiguration {
    /// Resource group parsed from `id`, if the id is long enough.
    pub fn resource_group(&self) -> Option<&str> {
        self.id.split('/').nth(4).filter(|segment| !segment.is_empty())
    }
}

/// Link between a VM and a maintenance configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConfigurationAssignment {
    #[serde(default)]
    pub name: Option<String>,
    pub maintenance_configuration_id: String,
}

impl ConfigurationAssignment {
    /// True when the assigned configuration id ends in `name` (case-insensitive).
    pub fn targets(&self, name: &str) -> bool {
        self.maintenance_configuration_id
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .is_some_and(|leaf| leaf.eq_ignore_ascii_case(name))
    }
}

/// Last completed installation as summarized on the instance view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LastInstallationSummary {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub installed_patch_count: u32,
    #[serde(default)]
    pub failed_patch_count: u32,
    #[serde(default)]
    pub pending_patch_count: u32,
}

#[cfg(test)]
mod tests {
    use super::{ConfigurationAssignment, MaintenanceConfiguration};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn resource_group_comes_from_id() {
        let config: MaintenanceConfiguration = serde_json::from_value(json!({
            "id": "/subscriptions/sub-1/resourceGroups/rg-Maint/providers/Microsoft.Maintenance/maintenanceConfigurations/weekly",
            "name": "weekly",
            "recur_every": "1Week Saturday"
        }))
        .expect("decode");
        assert_eq!(config.resource_group(), Some("rg-Maint"));
        assert_eq!(config.time_zone, None);

        let short = MaintenanceConfiguration {
            id: "weekly".to_string(),
            ..MaintenanceConfiguration::default()
        };
        assert_eq!(short.resource_group(), None);
    }

    #[test]
    fn assignment_matches_configuration_leaf() {
        let assignment = ConfigurationAssignment {
            name: None,
            maintenance_configuration_id:
                "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Maintenance/maintenanceConfigurations/Weekly"
                    .to_string(),
        };
        assert!(assignment.targets("weekly"));
        assert!(!assignment.targets("week"));
        assert!(!assignment.targets("weekly-2"));
    }
}
