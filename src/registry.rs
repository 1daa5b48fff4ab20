//! Discovers language runner images at startup by container-image label
//! introspection. Read-only snapshot for the process lifetime.
//!
//! Grounded on the label-filtered `list_images`/`list_containers` idiom used
//! throughout the pack's bollard-based Docker runtime files (e.g. filtering
//! on `"label" -> ["sandbox.runner=true"]`).

use bollard::image::ListImagesOptions;
use bollard::Docker;
use std::collections::HashMap;

pub const RUNNER_LABEL: &str = "sandbox.runner";
pub const RUNNER_LABEL_TRUE: &str = "sandbox.runner=true";
pub const LANGUAGE_LABEL: &str = "sandbox.language";

/// An immutable record of one discovered runner image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerInfo {
    pub language: String,
    pub image_reference: String,
}

/// Read-only mapping language -> RunnerInfo, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct RunnerCatalog {
    runners: HashMap<String, RunnerInfo>,
}

impl RunnerCatalog {
    /// Query the Docker daemon for images labeled `sandbox.runner=true` and
    /// index them by their `sandbox.language` label. Images missing or with
    /// an empty language label are skipped. On a label collision, the last
    /// image observed during discovery wins (order is otherwise unspecified).
    pub async fn discover(docker: &Docker) -> anyhow::Result<Self> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![RUNNER_LABEL_TRUE.to_string()]);

        let images = docker
            .list_images(Some(ListImagesOptions {
                all: false,
                filters,
                ..Default::default()
            }))
            .await?;

        let mut runners = HashMap::new();
        for image in images {
            let labels = &image.labels;
            let language = match labels.get(LANGUAGE_LABEL) {
                Some(lang) if !lang.trim().is_empty() => lang.clone(),
                _ => continue,
            };

            let image_reference = image
                .repo_tags
                .first()
                .cloned()
                .unwrap_or_else(|| image.id.clone());

            runners.insert(
                language.clone(),
                RunnerInfo {
                    language,
                    image_reference,
                },
            );
        }

        if runners.is_empty() {
            log::warn!("runner registry discovered no images labeled {RUNNER_LABEL_TRUE}; run_code will fail until one is available");
        }

        Ok(RunnerCatalog { runners })
    }

    /// Build a catalog directly from a set of runners, bypassing discovery.
    /// Used by tests and by callers that already have a fixed runner set.
    pub fn from_runners(runners: impl IntoIterator<Item = RunnerInfo>) -> Self {
        RunnerCatalog {
            runners: runners.into_iter().map(|r| (r.language.clone(), r)).collect(),
        }
    }

    pub fn lookup(&self, language: &str) -> Option<&RunnerInfo> {
        self.runners.get(language)
    }

    pub fn list(&self) -> Vec<&RunnerInfo> {
        self.runners.values().collect()
    }
}
