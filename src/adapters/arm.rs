//! Azure Resource Manager Adapter
//!
//! Talks to the resource manager REST API for:
//! - Resource provider registration
//! - Cluster extensions (Microsoft.KubernetesConfiguration/extensions)
//! - Role assignments (Microsoft.Authorization/roleAssignments)
//! - Managed cluster topology (Microsoft.ContainerService/managedClusters)

use crate::domain::ports::{
    AgentPoolProfile, ClusterInspector, ConfigurationSettings, ExtensionClient, ExtensionInfo,
    ExtensionInstall, ManagedClusterInfo, ManagedRole, OperationHandle, OperationKind,
    ProviderRegistry, ProvisioningState, RoleAssigner,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use reqwest::{header::HeaderMap, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const ASYNC_OPERATION_HEADER: &str = "Azure-AsyncOperation";
const LOCATION_HEADER: &str = "Location";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the resource manager adapter
#[derive(Debug, Clone)]
pub struct ArmConfig {
    /// Resource manager endpoint
    pub endpoint: String,
    /// Bearer token for the management audience
    pub access_token: String,
    /// Subscription the cluster lives in
    pub subscription_id: String,
    pub providers_api_version: String,
    pub extensions_api_version: String,
    pub role_assignments_api_version: String,
    pub managed_clusters_api_version: String,
    /// First delay between operation status polls
    pub poll_interval: Duration,
    /// Longest delay between operation status polls
    pub max_poll_interval: Duration,
    /// Give up on a long-running operation after this long
    pub operation_timeout: Duration,
    /// Timeout of a single HTTP request
    pub request_timeout: Duration,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://management.azure.com".to_string(),
            access_token: String::new(),
            subscription_id: String::new(),
            providers_api_version: "2022-09-01".to_string(),
            extensions_api_version: "2023-05-01".to_string(),
            role_assignments_api_version: "2022-04-01".to_string(),
            managed_clusters_api_version: "2023-10-01".to_string(),
            poll_interval: Duration::from_secs(2),
            max_poll_interval: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
struct ArmErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderResource {
    registration_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtensionResource {
    name: Option<String>,
    #[serde(default)]
    properties: Option<ExtensionProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtensionProperties {
    extension_type: Option<String>,
    provisioning_state: Option<String>,
    current_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AsyncOperationStatus {
    status: Option<String>,
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ManagedClusterResource {
    name: String,
    properties: ManagedClusterProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedClusterProperties {
    node_resource_group: String,
    #[serde(default)]
    identity_profile: BTreeMap<String, UserAssignedIdentity>,
    #[serde(default)]
    agent_pool_profiles: Vec<AgentPoolProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserAssignedIdentity {
    object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleAssignmentList {
    #[serde(default)]
    value: Vec<RoleAssignmentResource>,
}

#[derive(Debug, Deserialize)]
struct RoleAssignmentResource {
    id: String,
    properties: RoleAssignmentProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleAssignmentProperties {
    role_definition_id: String,
    #[serde(default)]
    scope: String,
}

/// Why a poll did not produce a terminal state
enum PollError {
    Pending,
    Failed(Error),
}

// =============================================================================
// ARM Client
// =============================================================================

/// Resource manager client implementing the remote ports
pub struct ArmClient {
    config: ArmConfig,
    http: reqwest::Client,
}

impl ArmClient {
    /// Create a new resource manager client
    pub fn new(config: ArmConfig) -> Result<Self> {
        if config.access_token.is_empty() {
            return Err(Error::Configuration(
                "An access token is required to call the resource manager".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("cluster-storage-addon/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!(
            "{}{}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            path,
            api_version
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.config.access_token)
    }

    fn extension_path(&self, resource_group: &str, cluster_name: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}/providers/Microsoft.KubernetesConfiguration/extensions/{}",
            self.config.subscription_id, resource_group, cluster_name, name
        )
    }

    fn extension_url(&self, resource_group: &str, cluster_name: &str, name: &str) -> String {
        self.url(
            &self.extension_path(resource_group, cluster_name, name),
            &self.config.extensions_api_version,
        )
    }

    /// Turn a non-success response into an error
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ArmErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or(ArmErrorDetail {
                code: status.canonical_reason().unwrap_or("Unknown").to_string(),
                message: body,
            });

        Err(Error::Arm {
            status: status.as_u16(),
            code: detail.code,
            message: detail.message,
        })
    }

    fn status_url(headers: &HeaderMap) -> Option<String> {
        headers
            .get(ASYNC_OPERATION_HEADER)
            .or_else(|| headers.get(LOCATION_HEADER))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Build an operation handle from the initial response of a mutation
    async fn handle_from(
        response: Response,
        kind: OperationKind,
        name: &str,
        resource_id: String,
        no_wait: bool,
    ) -> Result<OperationHandle> {
        let status_url = Self::status_url(response.headers());
        let body = response.text().await.unwrap_or_default();
        let initial_state = serde_json::from_str::<ExtensionResource>(&body)
            .ok()
            .and_then(|r| r.properties)
            .and_then(|p| p.provisioning_state)
            .map(|s| ProvisioningState::parse(&s));

        Ok(OperationHandle {
            kind,
            extension_name: name.to_string(),
            resource_id,
            status_url,
            initial_state,
            no_wait,
        })
    }

    /// One look at an operation. `None` while it is still running.
    async fn poll_once(&self, handle: &OperationHandle) -> Result<Option<ProvisioningState>> {
        match &handle.status_url {
            Some(url) => {
                let response = Self::check(self.request(Method::GET, url).send().await?).await?;
                if response.status() == StatusCode::ACCEPTED {
                    return Ok(None);
                }
                let body = response.text().await?;
                if body.trim().is_empty() {
                    // Location-style operations finish with an empty 200/204
                    return Ok(Some(ProvisioningState::Succeeded));
                }

                let status: AsyncOperationStatus = serde_json::from_str(&body)?;
                let state = status
                    .status
                    .as_deref()
                    .map(ProvisioningState::parse)
                    .unwrap_or(ProvisioningState::Succeeded);

                match (state.is_terminal(), state.is_succeeded(), status.error) {
                    (false, _, _) => Ok(None),
                    (true, false, Some(detail)) => Err(Error::OperationFailed {
                        operation: handle.kind.to_string(),
                        name: handle.extension_name.clone(),
                        state: state.to_string(),
                        message: detail.message,
                    }),
                    _ => Ok(Some(state)),
                }
            }
            None => {
                let url = self.url(&handle.resource_id, &self.config.extensions_api_version);
                let response = self.request(Method::GET, &url).send().await?;
                if response.status() == StatusCode::NOT_FOUND && handle.kind == OperationKind::Delete {
                    return Ok(Some(ProvisioningState::Succeeded));
                }
                let resource: ExtensionResource = Self::check(response).await?.json().await?;
                let state = resource
                    .properties
                    .and_then(|p| p.provisioning_state)
                    .map(|s| ProvisioningState::parse(&s))
                    .unwrap_or(ProvisioningState::Succeeded);
                Ok(state.is_terminal().then_some(state))
            }
        }
    }
}

// =============================================================================
// Provider Registry
// =============================================================================

#[async_trait]
impl ProviderRegistry for ArmClient {
    async fn is_registered(&self, subscription_id: &str, namespace: &str) -> Result<bool> {
        let url = self.url(
            &format!("/subscriptions/{}/providers/{}", subscription_id, namespace),
            &self.config.providers_api_version,
        );
        let provider: ProviderResource =
            Self::check(self.request(Method::GET, &url).send().await?).await?.json().await?;

        Ok(provider
            .registration_state
            .map(|s| s.eq_ignore_ascii_case("Registered"))
            .unwrap_or(false))
    }

    async fn register(&self, subscription_id: &str, namespace: &str) -> Result<()> {
        let url = self.url(
            &format!("/subscriptions/{}/providers/{}/register", subscription_id, namespace),
            &self.config.providers_api_version,
        );
        let body = json!({
            "thirdPartyProviderConsent": { "consentToAuthorization": false }
        });

        info!("Requesting registration of {}", namespace);
        Self::check(self.request(Method::POST, &url).json(&body).send().await?).await?;
        Ok(())
    }
}

// =============================================================================
// Extension Client
// =============================================================================

#[async_trait]
impl ExtensionClient for ArmClient {
    async fn show(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
    ) -> Result<Option<ExtensionInfo>> {
        let url = self.extension_url(resource_group, cluster_name, name);
        let response = self.request(Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resource: ExtensionResource = Self::check(response).await?.json().await?;
        let properties = resource.properties.unwrap_or_default();
        Ok(Some(ExtensionInfo {
            name: resource.name.unwrap_or_else(|| name.to_string()),
            extension_type: properties.extension_type.unwrap_or_default(),
            provisioning_state: properties
                .provisioning_state
                .map(|s| ProvisioningState::parse(&s))
                .unwrap_or(ProvisioningState::Succeeded),
            version: properties.current_version,
        }))
    }

    async fn create(
        &self,
        resource_group: &str,
        cluster_name: &str,
        install: &ExtensionInstall,
    ) -> Result<OperationHandle> {
        let scope = if install.scope == "cluster" {
            json!({ "cluster": { "releaseNamespace": install.release_namespace } })
        } else {
            json!({ "namespace": { "targetNamespace": install.release_namespace } })
        };
        let body = json!({
            "properties": {
                "extensionType": install.extension_type,
                "autoUpgradeMinorVersion": install.auto_upgrade_minor_version,
                "releaseTrain": install.release_train,
                "scope": scope,
                "configurationSettings": install.configuration_settings.to_wire_map(),
            }
        });

        let url = self.extension_url(resource_group, cluster_name, &install.name);
        debug!("PUT {}", url);
        let response = Self::check(self.request(Method::PUT, &url).json(&body).send().await?).await?;

        Self::handle_from(
            response,
            OperationKind::Create,
            &install.name,
            self.extension_path(resource_group, cluster_name, &install.name),
            false,
        )
        .await
    }

    async fn update(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
        settings: &ConfigurationSettings,
        no_wait: bool,
    ) -> Result<OperationHandle> {
        let body = json!({
            "properties": { "configurationSettings": settings.to_wire_map() }
        });

        let url = self.extension_url(resource_group, cluster_name, name);
        debug!("PATCH {}", url);
        let response =
            Self::check(self.request(Method::PATCH, &url).json(&body).send().await?).await?;

        Self::handle_from(
            response,
            OperationKind::Update,
            name,
            self.extension_path(resource_group, cluster_name, name),
            no_wait,
        )
        .await
    }

    async fn delete(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
        no_wait: bool,
    ) -> Result<OperationHandle> {
        let url = self.extension_url(resource_group, cluster_name, name);
        debug!("DELETE {}", url);
        let response = self.request(Method::DELETE, &url).send().await?;
        let resource_id = self.extension_path(resource_group, cluster_name, name);

        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::NO_CONTENT {
            return Ok(OperationHandle {
                kind: OperationKind::Delete,
                extension_name: name.to_string(),
                resource_id,
                status_url: None,
                initial_state: Some(ProvisioningState::Succeeded),
                no_wait,
            });
        }

        let response = Self::check(response).await?;
        let mut handle =
            Self::handle_from(response, OperationKind::Delete, name, resource_id, no_wait).await?;
        if handle.status_url.is_none() {
            handle.initial_state = Some(ProvisioningState::Succeeded);
        }
        Ok(handle)
    }

    async fn wait(&self, handle: &OperationHandle) -> Result<ProvisioningState> {
        if handle.status_url.is_none() {
            if let Some(state) = handle.initial_state.as_ref().filter(|s| s.is_terminal()) {
                return Ok(state.clone());
            }
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.poll_interval)
            .with_max_interval(self.config.max_poll_interval)
            .with_max_elapsed_time(Some(self.config.operation_timeout))
            .build();

        let result = backoff::future::retry(policy, move || async move {
            match self.poll_once(handle).await {
                Ok(Some(state)) => Ok(state),
                Ok(None) => Err(backoff::Error::transient(PollError::Pending)),
                Err(e) if e.is_transient() => {
                    warn!("Polling {} of {} failed: {}", handle.kind, handle.extension_name, e);
                    Err(backoff::Error::transient(PollError::Failed(e)))
                }
                Err(e) => Err(backoff::Error::permanent(PollError::Failed(e))),
            }
        })
        .await;

        match result {
            Ok(state) => {
                debug!("{} of {} finished: {}", handle.kind, handle.extension_name, state);
                Ok(state)
            }
            Err(PollError::Failed(e)) => Err(e),
            Err(PollError::Pending) => Err(Error::OperationTimeout {
                operation: handle.kind.to_string(),
                name: handle.extension_name.clone(),
                seconds: self.config.operation_timeout.as_secs(),
            }),
        }
    }
}

// =============================================================================
// Role Assigner
// =============================================================================

#[async_trait]
impl RoleAssigner for ArmClient {
    async fn assign(&self, scope: &str, role: ManagedRole, principal_id: &str) -> Result<()> {
        let assignment_name = uuid::Uuid::new_v4();
        let url = self.url(
            &format!(
                "{}/providers/Microsoft.Authorization/roleAssignments/{}",
                scope, assignment_name
            ),
            &self.config.role_assignments_api_version,
        );
        let body = json!({
            "properties": {
                "roleDefinitionId": format!(
                    "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{}",
                    self.config.subscription_id,
                    role.definition_id()
                ),
                "principalId": principal_id,
                "principalType": "ServicePrincipal",
            }
        });

        match Self::check(self.request(Method::PUT, &url).json(&body).send().await?).await {
            Ok(_) => Ok(()),
            Err(Error::Arm { status: 409, code, .. }) if code == "RoleAssignmentExists" => {
                debug!("{} already assigned on {}", role, scope);
                Ok(())
            }
            Err(e) => Err(Error::RoleAssignment {
                role: role.to_string(),
                scope: scope.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn revoke(&self, scope: &str, role: ManagedRole, principal_id: &str) -> Result<()> {
        let filter = urlencoding::encode(&format!("principalId eq '{}'", principal_id)).into_owned();
        let url = format!(
            "{}&$filter={}",
            self.url(
                &format!("{}/providers/Microsoft.Authorization/roleAssignments", scope),
                &self.config.role_assignments_api_version,
            ),
            filter
        );

        let list: RoleAssignmentList =
            Self::check(self.request(Method::GET, &url).send().await?).await?.json().await?;

        for assignment in list.value.iter().filter(|a| {
            a.properties
                .role_definition_id
                .to_ascii_lowercase()
                .ends_with(role.definition_id())
                && a.properties.scope.eq_ignore_ascii_case(scope)
        }) {
            let delete_url = self.url(&assignment.id, &self.config.role_assignments_api_version);
            let response = self.request(Method::DELETE, &delete_url).send().await?;
            if response.status() != StatusCode::NOT_FOUND {
                Self::check(response).await.map_err(|e| Error::RoleAssignment {
                    role: role.to_string(),
                    scope: scope.to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(())
    }
}

// =============================================================================
// Cluster Inspector
// =============================================================================

#[async_trait]
impl ClusterInspector for ArmClient {
    async fn managed_cluster(
        &self,
        subscription_id: &str,
        resource_group: &str,
        cluster_name: &str,
    ) -> Result<ManagedClusterInfo> {
        let url = self.url(
            &format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}",
                subscription_id, resource_group, cluster_name
            ),
            &self.config.managed_clusters_api_version,
        );
        let response = self.request(Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::ResourceNotFound {
                kind: "ManagedCluster".into(),
                name: cluster_name.into(),
            });
        }

        let cluster: ManagedClusterResource = Self::check(response).await?.json().await?;
        let kubelet_object_id = cluster
            .properties
            .identity_profile
            .get("kubeletidentity")
            .and_then(|i| i.object_id.clone())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "Managed cluster {} has no kubelet identity",
                    cluster_name
                ))
            })?;

        Ok(ManagedClusterInfo {
            name: cluster.name,
            resource_group: resource_group.to_string(),
            node_resource_group: cluster.properties.node_resource_group,
            kubelet_object_id,
            agent_pools: cluster.properties.agent_pool_profiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::config::KEY_STORAGE_POOL_CREATE;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EXT_PATH: &str = "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.ContainerService/managedClusters/aks/providers/Microsoft.KubernetesConfiguration/extensions/azurecontainerstorage";
    const SCOPE: &str = "/subscriptions/sub-1/resourceGroups/MC_rg_aks_eastus";

    fn client(server: &MockServer) -> ArmClient {
        ArmClient::new(ArmConfig {
            endpoint: server.uri(),
            access_token: "token".into(),
            subscription_id: "sub-1".into(),
            poll_interval: Duration::from_millis(5),
            max_poll_interval: Duration::from_millis(10),
            operation_timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    fn install() -> ExtensionInstall {
        let mut settings = ConfigurationSettings::new();
        settings.push(KEY_STORAGE_POOL_CREATE, false);
        ExtensionInstall {
            name: "azurecontainerstorage".into(),
            extension_type: "microsoft.azurecontainerstorage".into(),
            auto_upgrade_minor_version: true,
            release_train: "stable".into(),
            scope: "cluster".into(),
            release_namespace: "acstor".into(),
            configuration_settings: settings,
        }
    }

    #[test]
    fn test_requires_token() {
        assert!(ArmClient::new(ArmConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_show_missing_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EXT_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "ResourceNotFound", "message": "not found" }
            })))
            .mount(&server)
            .await;

        let found = client(&server).show("rg", "aks", "azurecontainerstorage").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_show_installed_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EXT_PATH))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "azurecontainerstorage",
                "properties": {
                    "extensionType": "microsoft.azurecontainerstorage",
                    "provisioningState": "Succeeded",
                    "currentVersion": "1.1.0"
                }
            })))
            .mount(&server)
            .await;

        let ext = client(&server)
            .show("rg", "aks", "azurecontainerstorage")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ext.extension_type, "microsoft.azurecontainerstorage");
        assert_eq!(ext.provisioning_state, ProvisioningState::Succeeded);
        assert_eq!(ext.version.as_deref(), Some("1.1.0"));
    }

    #[tokio::test]
    async fn test_create_and_wait() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(EXT_PATH))
            .and(query_param("api-version", "2023-05-01"))
            .and(body_partial_json(json!({
                "properties": {
                    "extensionType": "microsoft.azurecontainerstorage",
                    "autoUpgradeMinorVersion": true,
                    "releaseTrain": "stable",
                    "scope": { "cluster": { "releaseNamespace": "acstor" } },
                    "configurationSettings": { "cli.storagePool.create": "false" }
                }
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header(ASYNC_OPERATION_HEADER, format!("{}/operations/op-1", server.uri()).as_str())
                    .set_body_json(json!({ "properties": { "provisioningState": "Creating" } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Succeeded" })))
            .mount(&server)
            .await;

        let arm = client(&server);
        let handle = arm.create("rg", "aks", &install()).await.unwrap();
        assert_eq!(handle.initial_state, Some(ProvisioningState::Creating));
        assert!(handle.status_url.is_some());
        assert_eq!(arm.wait(&handle).await.unwrap(), ProvisioningState::Succeeded);
    }

    #[tokio::test]
    async fn test_wait_surfaces_operation_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(EXT_PATH))
            .and(body_partial_json(json!({
                "properties": { "configurationSettings": { "cli.storagePool.uninstallValidation": "true" } }
            })))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header(ASYNC_OPERATION_HEADER, format!("{}/operations/op-2", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": { "code": "ExtensionOperationFailed", "message": "helm: pre-upgrade hooks failed" }
            })))
            .mount(&server)
            .await;

        let arm = client(&server);
        let handle = arm
            .update(
                "rg",
                "aks",
                "azurecontainerstorage",
                &ConfigurationSettings::uninstall_validation(true),
                false,
            )
            .await
            .unwrap();
        let err = arm.wait(&handle).await.unwrap_err();
        assert_matches!(err, Error::OperationFailed { ref message, .. } if message.contains("pre-upgrade hooks failed"));
    }

    #[tokio::test]
    async fn test_wait_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/operations/op-3"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "code": "InternalServerError", "message": "try again" }
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Succeeded" })))
            .expect(1)
            .mount(&server)
            .await;

        let handle = OperationHandle {
            kind: OperationKind::Update,
            extension_name: "azurecontainerstorage".into(),
            resource_id: EXT_PATH.into(),
            status_url: Some(format!("{}/operations/op-3", server.uri())),
            initial_state: Some(ProvisioningState::Updating),
            no_wait: false,
        };
        assert_eq!(client(&server).wait(&handle).await.unwrap(), ProvisioningState::Succeeded);
    }

    #[tokio::test]
    async fn test_delete_without_status_url() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(EXT_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let arm = client(&server);
        let handle = arm.delete("rg", "aks", "azurecontainerstorage", true).await.unwrap();
        assert!(handle.no_wait);
        assert_eq!(arm.wait(&handle).await.unwrap(), ProvisioningState::Succeeded);
    }

    #[tokio::test]
    async fn test_provider_registration_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/providers/Microsoft.KubernetesConfiguration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "namespace": "Microsoft.KubernetesConfiguration",
                "registrationState": "Registered"
            })))
            .mount(&server)
            .await;

        let registered = client(&server)
            .is_registered("sub-1", "Microsoft.KubernetesConfiguration")
            .await
            .unwrap();
        assert!(registered);
    }

    #[tokio::test]
    async fn test_assign_existing_role_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/subscriptions/sub-1/resourceGroups/MC_rg_aks_eastus/providers/Microsoft\.Authorization/roleAssignments/[0-9a-f-]{36}$"))
            .and(body_partial_json(json!({
                "properties": {
                    "principalId": "kubelet-oid",
                    "roleDefinitionId": "/subscriptions/sub-1/providers/Microsoft.Authorization/roleDefinitions/acdd72a7-3385-48ef-bd42-f606fba81ae7"
                }
            })))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": { "code": "RoleAssignmentExists", "message": "The role assignment already exists." }
            })))
            .mount(&server)
            .await;

        client(&server)
            .assign(SCOPE, ManagedRole::Reader, "kubelet-oid")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_assign_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": "AuthorizationFailed", "message": "no permission" }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .assign(SCOPE, ManagedRole::ElasticSanOwner, "kubelet-oid")
            .await
            .unwrap_err();
        assert_matches!(err, Error::RoleAssignment { .. });
    }

    #[tokio::test]
    async fn test_revoke_deletes_matching_assignment() {
        let server = MockServer::start().await;
        let assignment_id = format!("{}/providers/Microsoft.Authorization/roleAssignments/1111", SCOPE);
        Mock::given(method("GET"))
            .and(path(format!("{}/providers/Microsoft.Authorization/roleAssignments", SCOPE)))
            .and(query_param("$filter", "principalId eq 'kubelet-oid'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {
                        "id": assignment_id,
                        "properties": {
                            "roleDefinitionId": "/subscriptions/sub-1/providers/Microsoft.Authorization/roleDefinitions/4d97b98b-1d4f-4787-a291-c67834d212e7",
                            "principalId": "kubelet-oid",
                            "scope": SCOPE
                        }
                    },
                    {
                        "id": format!("{}/providers/Microsoft.Authorization/roleAssignments/2222", SCOPE),
                        "properties": {
                            "roleDefinitionId": "/subscriptions/sub-1/providers/Microsoft.Authorization/roleDefinitions/acdd72a7-3385-48ef-bd42-f606fba81ae7",
                            "principalId": "kubelet-oid",
                            "scope": SCOPE
                        }
                    }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(assignment_id.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .revoke(SCOPE, ManagedRole::NetworkContributor, "kubelet-oid")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_managed_cluster_topology() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.ContainerService/managedClusters/aks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "aks",
                "properties": {
                    "nodeResourceGroup": "MC_rg_aks_eastus",
                    "identityProfile": {
                        "kubeletidentity": { "objectId": "kubelet-oid", "clientId": "c" }
                    },
                    "agentPoolProfiles": [
                        { "name": "nodepool1", "vmSize": "Standard_D4s_v3", "count": 3, "mode": "System" },
                        { "name": "nvmepool", "vmSize": "Standard_L8s_v3", "count": 3, "mode": "User" }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let cluster = client(&server).managed_cluster("sub-1", "rg", "aks").await.unwrap();
        assert_eq!(cluster.node_resource_group, "MC_rg_aks_eastus");
        assert_eq!(cluster.kubelet_object_id, "kubelet-oid");
        assert_eq!(cluster.agent_pools.len(), 2);
        assert_eq!(cluster.agent_pools[1].vm_size, "Standard_L8s_v3");
    }
}
