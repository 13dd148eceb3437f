//! `kubectl`-backed client
//!
//! Each primitive is one `kubectl` invocation run under a hard timeout;
//! the limit patch reads the deployment first.
//! Manifests go in on stdin as JSON; failures are classified from stderr.

use super::{OrchestrationClient, WorkloadHandle};
use crate::catalog::{EphemeralWorkloadSpec, ResourceRequirements};
use crate::error::OrchestrationError;
use crate::types::{Labels, LabelSelector, Quantity, ResourceName};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Client that shells out to `kubectl`
#[derive(Debug, Clone)]
pub struct KubectlClient {
    binary: String,
    context: Option<String>,
    timeout: Duration,
    container_index: usize,
}

impl KubectlClient {
    /// Client using `binary` with a per-call `timeout`
    #[must_use]
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            context: None,
            timeout,
            container_index: 0,
        }
    }

    /// Use a specific kubeconfig context
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Patch the container at `index` in the deployment's pod template
    #[inline]
    #[must_use]
    pub fn with_container_index(mut self, index: usize) -> Self {
        self.container_index = index;
        self
    }

    async fn run(
        &self,
        args: &[String],
        stdin: Option<String>,
        target: &ObjectRef<'_>,
    ) -> Result<String, OrchestrationError> {
        let mut cmd = Command::new(&self.binary);
        if let Some(ctx) = &self.context {
            cmd.arg("--context").arg(ctx);
        }
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary, ?args, "running kubectl");

        let mut child = cmd.spawn().map_err(|e| {
            OrchestrationError::Transient(format!("failed to spawn {}: {e}", self.binary))
        })?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .await
                    .map_err(|e| OrchestrationError::Transient(format!("failed to write manifest: {e}")))?;
            }
        }

        // On timeout the child is dropped with the future and killed.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(status = ?output.status.code(), stderr = %stderr.trim(), "kubectl failed");
                Err(classify_stderr(&stderr, target.kind, target.namespace, target.name))
            }
            Ok(Err(e)) => Err(OrchestrationError::Transient(format!("kubectl did not complete: {e}"))),
            Err(_) => Err(OrchestrationError::Transient(format!(
                "kubectl timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

struct ObjectRef<'a> {
    kind: &'a str,
    namespace: &'a str,
    name: &'a str,
}

/// Map a failed `kubectl` stderr to an error kind
///
/// Only definitive API answers map to `AlreadyExists`, `TargetNotFound` or
/// `InvalidValue`; everything else is transient.
#[must_use]
pub fn classify_stderr(stderr: &str, kind: &str, namespace: &str, name: &str) -> OrchestrationError {
    let lower = stderr.to_ascii_lowercase();
    let target = || (kind.to_string(), namespace.to_string(), name.to_string());

    if lower.contains("alreadyexists") || lower.contains("already exists") {
        let (kind, namespace, name) = target();
        OrchestrationError::AlreadyExists { kind, namespace, name }
    } else if lower.contains("notfound") || lower.contains("not found") {
        let (kind, namespace, name) = target();
        OrchestrationError::TargetNotFound { kind, namespace, name }
    } else if lower.contains("invalid value")
        || lower.contains(" is invalid")
        || lower.contains("unprocessable")
    {
        OrchestrationError::InvalidValue(stderr.trim().to_string())
    } else {
        OrchestrationError::Transient(stderr.trim().to_string())
    }
}

fn resources_json(req: &ResourceRequirements) -> Value {
    let mut map = Map::new();
    if let Some(memory) = &req.memory {
        map.insert("memory".to_string(), Value::String(memory.to_string()));
    }
    if let Some(cpu) = &req.cpu {
        map.insert("cpu".to_string(), Value::String(cpu.to_string()));
    }
    Value::Object(map)
}

/// Pod manifest for an ephemeral workload
///
/// `duration_secs` becomes `activeDeadlineSeconds`, so the orchestrator
/// terminates the workload on its own.
#[must_use]
pub fn pod_manifest(namespace: &str, spec: &EphemeralWorkloadSpec, labels: &Labels) -> Value {
    let mut container = json!({
        "name": spec.name,
        "image": spec.image,
    });
    if !spec.command.is_empty() {
        container["command"] = json!(spec.command);
    }
    if !spec.requests.is_empty() || !spec.limits.is_empty() {
        let mut resources = Map::new();
        if !spec.requests.is_empty() {
            resources.insert("requests".to_string(), resources_json(&spec.requests));
        }
        if !spec.limits.is_empty() {
            resources.insert("limits".to_string(), resources_json(&spec.limits));
        }
        container["resources"] = Value::Object(resources);
    }

    let mut pod_spec = json!({
        "restartPolicy": spec.restart_policy.as_str(),
        "containers": [container],
    });
    if let Some(secs) = spec.duration_secs {
        pod_spec["activeDeadlineSeconds"] = json!(secs);
    }

    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": spec.name,
            "namespace": namespace,
            "labels": labels,
        },
        "spec": pod_spec,
    })
}

/// JSON patch setting one container resource limit
///
/// `add` needs the parent object to exist, so the patch creates whichever
/// of `resources` and `resources/limits` the container in `deployment`
/// (the object as read from the API) is missing. Other limits are kept.
///
/// # Errors
/// Returns `OrchestrationError::InvalidValue` if the pod template has no
/// container at `container_index`.
pub fn resource_limit_patch(
    deployment: &Value,
    container_index: usize,
    resource: ResourceName,
    value: &Quantity,
) -> Result<Value, OrchestrationError> {
    let container_path = format!("/spec/template/spec/containers/{container_index}");
    let container = deployment.pointer(&container_path).ok_or_else(|| {
        OrchestrationError::InvalidValue(format!("pod template has no container at index {container_index}"))
    })?;

    let (path, patch_value) = match container.get("resources").filter(|r| r.is_object()) {
        None => (
            format!("{container_path}/resources"),
            json!({ "limits": { resource.as_str(): value.as_str() } }),
        ),
        Some(resources) if !resources.get("limits").is_some_and(Value::is_object) => (
            format!("{container_path}/resources/limits"),
            json!({ resource.as_str(): value.as_str() }),
        ),
        Some(_) => (format!("{container_path}/resources/limits/{resource}"), json!(value.as_str())),
    };

    Ok(json!([{ "op": "add", "path": path, "value": patch_value }]))
}

fn count_deleted(stdout: &str) -> usize {
    stdout.lines().filter(|l| !l.trim().is_empty()).count()
}

#[async_trait]
impl OrchestrationClient for KubectlClient {
    async fn create_ephemeral_workload(
        &self,
        namespace: &str,
        spec: &EphemeralWorkloadSpec,
        labels: &Labels,
    ) -> Result<WorkloadHandle, OrchestrationError> {
        let manifest = pod_manifest(namespace, spec, labels).to_string();
        let args = ["create", "-f", "-", "-o", "name"].map(String::from);
        let target = ObjectRef {
            kind: "pod",
            namespace,
            name: &spec.name,
        };

        self.run(&args, Some(manifest), &target).await?;
        Ok(WorkloadHandle::pod(namespace, &spec.name))
    }

    async fn delete_workloads_by_selector(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<usize, OrchestrationError> {
        let args = vec![
            "delete".to_string(),
            "pods".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            "-l".to_string(),
            selector.to_string(),
            "--ignore-not-found".to_string(),
            "--wait=false".to_string(),
            "-o".to_string(),
            "name".to_string(),
        ];
        let selector_text = selector.to_string();
        let target = ObjectRef {
            kind: "pods",
            namespace,
            name: &selector_text,
        };

        let stdout = self.run(&args, None, &target).await?;
        Ok(count_deleted(&stdout))
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        deployment: &str,
        replicas: u32,
    ) -> Result<(), OrchestrationError> {
        let args = vec![
            "scale".to_string(),
            format!("deployment/{deployment}"),
            "-n".to_string(),
            namespace.to_string(),
            format!("--replicas={replicas}"),
        ];
        let target = ObjectRef {
            kind: "deployment",
            namespace,
            name: deployment,
        };

        self.run(&args, None, &target).await.map(|_| ())
    }

    async fn patch_deployment_resource_limit(
        &self,
        namespace: &str,
        deployment: &str,
        resource: ResourceName,
        value: &Quantity,
    ) -> Result<(), OrchestrationError> {
        let target = ObjectRef {
            kind: "deployment",
            namespace,
            name: deployment,
        };

        let get = vec![
            "get".to_string(),
            format!("deployment/{deployment}"),
            "-n".to_string(),
            namespace.to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        let current: Value = serde_json::from_str(&self.run(&get, None, &target).await?)
            .map_err(|e| OrchestrationError::Transient(format!("unreadable deployment JSON: {e}")))?;

        let patch = resource_limit_patch(&current, self.container_index, resource, value)?;
        let args = vec![
            "patch".to_string(),
            "deployment".to_string(),
            deployment.to_string(),
            "-n".to_string(),
            namespace.to_string(),
            "--type=json".to_string(),
            "-p".to_string(),
            patch.to_string(),
        ];

        self.run(&args, None, &target).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RestartPolicy;

    #[test]
    fn classify_known_api_answers() {
        let err = classify_stderr(
            "Error from server (AlreadyExists): pods \"incident-memory-hog\" already exists",
            "pod",
            "demo-apps",
            "incident-memory-hog",
        );
        assert!(matches!(err, OrchestrationError::AlreadyExists { ref name, .. } if name == "incident-memory-hog"));

        let err = classify_stderr(
            "Error from server (NotFound): deployments.apps \"sample-app\" not found",
            "deployment",
            "demo-apps",
            "sample-app",
        );
        assert!(matches!(err, OrchestrationError::TargetNotFound { .. }));

        let err = classify_stderr(
            "The Deployment \"sample-app\" is invalid: spec.template.spec.containers[0].resources.requests: Invalid value: \"32Mi\"",
            "deployment",
            "demo-apps",
            "sample-app",
        );
        assert!(matches!(err, OrchestrationError::InvalidValue(_)));
    }

    #[test]
    fn classify_everything_else_as_transient() {
        let err = classify_stderr(
            "Unable to connect to the server: dial tcp 127.0.0.1:6443: connect: connection refused",
            "deployment",
            "demo-apps",
            "sample-app",
        );
        assert!(matches!(err, OrchestrationError::Transient(_)));
    }

    #[test]
    fn pod_manifest_carries_labels_and_deadline() {
        let spec = EphemeralWorkloadSpec::new("incident-cpu-hog", "polinux/stress")
            .with_command(["stress", "--cpu", "2"])
            .with_limits(ResourceRequirements::default().with_cpu("1".parse().unwrap()))
            .with_restart_policy(RestartPolicy::Never)
            .with_duration_secs(300);
        let labels = LabelSelector::for_scenario("cpu-spike").unwrap().as_labels();

        let manifest = pod_manifest("demo-apps", &spec, &labels);

        assert_eq!(manifest["metadata"]["name"], "incident-cpu-hog");
        assert_eq!(manifest["metadata"]["namespace"], "demo-apps");
        assert_eq!(manifest["metadata"]["labels"]["infraguard.io/incident"], "cpu-spike");
        assert_eq!(manifest["spec"]["activeDeadlineSeconds"], 300);
        assert_eq!(manifest["spec"]["restartPolicy"], "Never");
        assert_eq!(manifest["spec"]["containers"][0]["resources"]["limits"]["cpu"], "1");
        assert!(manifest["spec"]["containers"][0]["resources"].get("requests").is_none());
    }

    fn deployment_with(resources: Option<Value>) -> Value {
        let mut container = json!({ "name": "app", "image": "nginx" });
        if let Some(resources) = resources {
            container["resources"] = resources;
        }
        json!({ "spec": { "template": { "spec": { "containers": [{ "name": "sidecar" }, container] } } } })
    }

    #[test]
    fn limit_patch_targets_existing_limits() {
        let current = deployment_with(Some(json!({ "limits": { "cpu": "500m" } })));
        let patch = resource_limit_patch(&current, 1, ResourceName::Memory, &"64Mi".parse().unwrap()).unwrap();
        assert_eq!(
            patch[0]["path"],
            "/spec/template/spec/containers/1/resources/limits/memory"
        );
        assert_eq!(patch[0]["value"], "64Mi");
    }

    #[test]
    fn limit_patch_creates_missing_parents() {
        let quantity: Quantity = "16Mi".parse().unwrap();

        let current = deployment_with(Some(json!({ "requests": { "memory": "8Mi" } })));
        let patch = resource_limit_patch(&current, 1, ResourceName::Memory, &quantity).unwrap();
        assert_eq!(patch[0]["path"], "/spec/template/spec/containers/1/resources/limits");
        assert_eq!(patch[0]["value"], json!({ "memory": "16Mi" }));

        let current = deployment_with(None);
        let patch = resource_limit_patch(&current, 1, ResourceName::Memory, &quantity).unwrap();
        assert_eq!(patch[0]["path"], "/spec/template/spec/containers/1/resources");
        assert_eq!(patch[0]["value"], json!({ "limits": { "memory": "16Mi" } }));
    }

    #[test]
    fn limit_patch_needs_the_container() {
        let current = deployment_with(None);
        let err = resource_limit_patch(&current, 5, ResourceName::Cpu, &"1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidValue(_)));
    }

    #[test]
    fn deleted_lines_counted() {
        assert_eq!(count_deleted(""), 0);
        assert_eq!(count_deleted("pod/a\npod/b\n"), 2);
    }

    #[tokio::test]
    async fn missing_binary_is_transient() {
        let client = KubectlClient::new("/nonexistent/kubectl-for-tests", Duration::from_secs(1));
        let err = client
            .scale_deployment("demo-apps", "sample-app", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Transient(_)));
    }
}
