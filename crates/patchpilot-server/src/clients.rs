//! HTTP implementations of the agent and inventory collaborators.

use async_trait::async_trait;
use log::debug;
use patchpilot_protocol::{
    AgentClient, AgentReply, BootDiagnosticsData, CollaboratorError, ConfigurationAssignment,
    InstallationRun, InventoryProvider, InventoryScope, MaintenanceConfiguration, VmInstanceView,
    VmInventoryEntry, VmLocator,
};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Agent runs wait for tool calls to finish, so they get a longer budget.
const AGENT_TIMEOUT: Duration = Duration::from_secs(120);
const INVENTORY_TIMEOUT: Duration = Duration::from_secs(60);

fn build_client(timeout: Duration) -> Result<Client, CollaboratorError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| CollaboratorError::Request(format!("http client: {err}")))
}

fn endpoint_url(endpoint: &str, segments: &[&str]) -> Result<Url, CollaboratorError> {
    let mut url = Url::parse(endpoint)
        .map_err(|err| CollaboratorError::Request(format!("invalid endpoint {endpoint}: {err}")))?;
    url.path_segments_mut()
        .map_err(|_| CollaboratorError::Request(format!("endpoint cannot be a base: {endpoint}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn transport_error(what: &str, err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout(format!("{what}: {err}"))
    } else {
        CollaboratorError::Request(format!("{what}: {err}"))
    }
}

async fn read_json<T: DeserializeOwned>(
    what: &str,
    response: reqwest::Response,
) -> Result<T, CollaboratorError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(CollaboratorError::NotFound(what.to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CollaboratorError::Request(format!(
            "{what}: HTTP {status}: {body}"
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| CollaboratorError::Decode(format!("{what}: {err}")))
}

#[derive(Serialize)]
struct RunRequest<'a> {
    thread_id: Option<&'a str>,
    prompt: &'a str,
}

/// Agent runtime reached over HTTP: `POST {endpoint}/agents/{agent_id}/runs`.
#[derive(Clone)]
pub struct HttpAgentClient {
    client: Client,
    endpoint: String,
    agent_id: String,
}

impl HttpAgentClient {
    pub fn new(
        endpoint: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(AGENT_TIMEOUT)?,
            endpoint: endpoint.into(),
            agent_id: agent_id.into(),
        })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn submit(
        &self,
        thread_id: Option<&str>,
        prompt: &str,
    ) -> Result<AgentReply, CollaboratorError> {
        let url = endpoint_url(&self.endpoint, &["agents", &self.agent_id, "runs"])?;
        debug!(
            "submitting agent run (agent_id={}, thread_id={:?}, prompt_len={})",
            self.agent_id,
            thread_id,
            prompt.len()
        );
        let response = self
            .client
            .post(url)
            .json(&RunRequest { thread_id, prompt })
            .send()
            .await
            .map_err(|err| transport_error("agent run", err))?;
        read_json("agent run", response).await
    }
}

#[derive(Serialize)]
struct HistoryRequest<'a> {
    subscriptions: [&'a str; 1],
    query: &'a str,
}

/// Inventory service reached over HTTP.
#[derive(Clone)]
pub struct HttpInventoryProvider {
    client: Client,
    endpoint: String,
}

impl HttpInventoryProvider {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(INVENTORY_TIMEOUT)?,
            endpoint: endpoint.into(),
        })
    }

    fn vm_url(&self, vm: &VmLocator, leaf: &str) -> Result<Url, CollaboratorError> {
        endpoint_url(
            &self.endpoint,
            &[
                "subscriptions",
                &vm.subscription_id,
                "resourceGroups",
                &vm.resource_group,
                "virtualMachines",
                &vm.vm_name,
                leaf,
            ],
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        url: Url,
    ) -> Result<T, CollaboratorError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| transport_error(what, err))?;
        read_json(what, response).await
    }
}

#[async_trait]
impl InventoryProvider for HttpInventoryProvider {
    async fn list_vms(
        &self,
        scope: &InventoryScope,
    ) -> Result<Vec<VmInventoryEntry>, CollaboratorError> {
        let url = endpoint_url(&self.endpoint, &["vms", "query"])?;
        let response = self
            .client
            .post(url)
            .json(scope)
            .send()
            .await
            .map_err(|err| transport_error("vm listing", err))?;
        read_json("vm listing", response).await
    }

    async fn get_vm_status(&self, vm: &VmLocator) -> Result<VmInstanceView, CollaboratorError> {
        let url = self.vm_url(vm, "instanceView")?;
        self.get_json(&format!("instance view of {}", vm.vm_name), url)
            .await
    }

    async fn boot_diagnostics_data(
        &self,
        vm: &VmLocator,
    ) -> Result<BootDiagnosticsData, CollaboratorError> {
        let url = self.vm_url(vm, "bootDiagnostics")?;
        self.get_json(&format!("boot diagnostics of {}", vm.vm_name), url)
            .await
    }

    async fn query_history(
        &self,
        subscription_id: &str,
        query: &str,
    ) -> Result<Vec<InstallationRun>, CollaboratorError> {
        let url = endpoint_url(&self.endpoint, &["resourceGraph", "query"])?;
        let response = self
            .client
            .post(url)
            .json(&HistoryRequest {
                subscriptions: [subscription_id],
                query,
            })
            .send()
            .await
            .map_err(|err| transport_error("installation history", err))?;
        read_json("installation history", response).await
    }

    async fn list_maintenance_configurations(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<MaintenanceConfiguration>, CollaboratorError> {
        let url = endpoint_url(
            &self.endpoint,
            &["subscriptions", subscription_id, "maintenanceConfigurations"],
        )?;
        self.get_json("maintenance configurations", url).await
    }

    async fn get_maintenance_configuration(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<MaintenanceConfiguration, CollaboratorError> {
        let url = endpoint_url(
            &self.endpoint,
            &[
                "subscriptions",
                subscription_id,
                "resourceGroups",
                resource_group,
                "maintenanceConfigurations",
                name,
            ],
        )?;
        self.get_json(&format!("maintenance configuration {name}"), url)
            .await
    }

    async fn list_configuration_assignments(
        &self,
        vm: &VmLocator,
    ) -> Result<Vec<ConfigurationAssignment>, CollaboratorError> {
        let url = self.vm_url(vm, "configurationAssignments")?;
        self.get_json(&format!("configuration assignments of {}", vm.vm_name), url)
            .await
    }
}
