// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes manifest construction for builds, deployments, and staged files.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::cluster::{BuildJobSpec, BuildSource, DeploySpec};

/// Parameters for building a BuildKit job.
pub(super) struct BuildJobParams<'a> {
    pub spec: &'a BuildJobSpec,
    pub namespace: &'a str,
    pub builder_image: String,
    pub fetch_image: String,
}

/// Shell script that reassembles a staged config-map into a build context.
///
/// Keys are base64-encoded relative paths with `=` → `_eq_`, `+` → `_plus_`,
/// `/` → `_slash_` so arbitrary paths survive config-map key constraints.
const UNPACK_STAGED_FILES: &str = r#"set -e
cd /workspace
for f in /staged/*; do
  key=$(basename "$f")
  path=$(printf '%s' "$key" | sed -e 's/_slash_/\//g' -e 's/_plus_/+/g' -e 's/_eq_/=/g' | base64 -d)
  mkdir -p "$(dirname "./$path")"
  base64 -d "$f" > "./$path"
done
"#;

fn labels(extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = [(
        "app.kubernetes.io/managed-by".to_string(),
        "slipway".to_string(),
    )]
    .into();
    for (k, v) in extra {
        map.insert(k.to_string(), v.to_string());
    }
    map
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar { name: name.to_string(), value: Some(value.to_string()), ..Default::default() }
}

/// Build a batch/v1 Job that produces and pushes the agent image.
pub(super) fn build_job(params: &BuildJobParams<'_>) -> Job {
    let spec = params.spec;
    let job_name = format!("job-{}", spec.job_id);

    let mut volumes = vec![Volume {
        name: "workspace".to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }];
    let mut init_containers = Vec::new();

    let workspace_mount = VolumeMount {
        name: "workspace".to_string(),
        mount_path: "/workspace".to_string(),
        ..Default::default()
    };

    // Build context comes from one of three places: a git clone, the
    // backend's uploaded tarball, or a staged config-map of instrumented
    // files. In all cases the context ends up in the workspace volume.
    match &spec.source {
        BuildSource::Git { url } => {
            init_containers.push(Container {
                name: "clone".to_string(),
                image: Some("alpine/git:2.45.2".to_string()),
                args: Some(vec![
                    "clone".to_string(),
                    "--depth".to_string(),
                    "1".to_string(),
                    url.clone(),
                    "/workspace".to_string(),
                ]),
                volume_mounts: Some(vec![workspace_mount.clone()]),
                ..Default::default()
            });
        }
        BuildSource::Upload { agent_name, backend_url, agent_path, files_configmap } => {
            match files_configmap {
                Some(configmap) => {
                    volumes.push(Volume {
                        name: "staged".to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: configmap.clone(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    });
                    init_containers.push(Container {
                        name: "unpack".to_string(),
                        image: Some(params.fetch_image.clone()),
                        command: Some(vec![
                            "sh".to_string(),
                            "-c".to_string(),
                            UNPACK_STAGED_FILES.to_string(),
                        ]),
                        volume_mounts: Some(vec![
                            workspace_mount.clone(),
                            VolumeMount {
                                name: "staged".to_string(),
                                mount_path: "/staged".to_string(),
                                read_only: Some(true),
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    });
                }
                None => {
                    let mut download_url =
                        format!("{backend_url}/api/v1/agents/{agent_name}/download");
                    if let Some(version) =
                        agent_path.as_deref().and_then(slipway_core::naming::version_from_path)
                    {
                        download_url.push_str(&format!("?version={version}"));
                    }
                    init_containers.push(Container {
                        name: "fetch".to_string(),
                        image: Some(params.fetch_image.clone()),
                        command: Some(vec![
                            "sh".to_string(),
                            "-c".to_string(),
                            format!(
                                "wget -q -O /tmp/agent.tar.gz '{download_url}' && \
                                 tar -xzf /tmp/agent.tar.gz -C /workspace"
                            ),
                        ]),
                        volume_mounts: Some(vec![workspace_mount.clone()]),
                        ..Default::default()
                    });
                }
            }
        }
    }

    let build_container = Container {
        name: "buildkit".to_string(),
        image: Some(params.builder_image.clone()),
        command: Some(vec!["buildctl-daemonless.sh".to_string()]),
        args: Some(vec![
            "build".to_string(),
            "--frontend".to_string(),
            "dockerfile.v0".to_string(),
            "--local".to_string(),
            "context=/workspace".to_string(),
            "--local".to_string(),
            "dockerfile=/workspace".to_string(),
            "--output".to_string(),
            format!("type=image,name={},push=true", spec.image_destination),
        ]),
        env: Some(vec![env_var("BUILDKITD_FLAGS", "--oci-worker-no-process-sandbox")]),
        volume_mounts: Some(vec![workspace_mount]),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(job_name.clone()),
            namespace: Some(params.namespace.to_string()),
            labels: Some(labels(&[("slipway.dev/build-job", spec.job_id.as_str())])),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(3600),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(&[("job-name", job_name.as_str())])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: if init_containers.is_empty() {
                        None
                    } else {
                        Some(init_containers)
                    },
                    containers: vec![build_container],
                    volumes: Some(volumes),
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build an apps/v1 Deployment for a running agent.
pub(super) fn agent_deployment(spec: &DeploySpec, namespace: &str) -> Deployment {
    let env: Vec<EnvVar> = spec.env.iter().map(|(k, v)| env_var(k, v)).collect();
    let pod_labels = labels(&[("app", spec.deployment_name.as_str())]);

    Deployment {
        metadata: ObjectMeta {
            name: Some(spec.deployment_name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(pod_labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(
                    [("app".to_string(), spec.deployment_name.clone())].into(),
                ),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(pod_labels), ..Default::default() }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "agent".to_string(),
                        image: Some(spec.image_reference.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: i32::from(spec.port),
                            ..Default::default()
                        }]),
                        env: if env.is_empty() { None } else { Some(env) },
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build a core/v1 ConfigMap holding a base64-encoded file tree.
pub(super) fn files_configmap(
    name: &str,
    namespace: &str,
    data: BTreeMap<String, String>,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(&[("slipway.dev/staged-files", "true")])),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
