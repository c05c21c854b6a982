//! Minimal deployment descriptors for projects that have none
//!
//! Targets a static web app: one service, one Bicep module, one parameter
//! file. Existing files are never overwritten.

use std::path::Path;

const BICEP: &str = r"targetScope = 'resourceGroup'

@description('Environment name, used to derive resource names')
param environmentName string

@description('Primary location for all resources')
param location string = resourceGroup().location

var token = toLower(uniqueString(subscription().id, resourceGroup().id, environmentName))

resource web 'Microsoft.Web/staticSites@2022-09-01' = {
  name: 'swa-${token}'
  location: location
  tags: { 'azd-service-name': 'web' }
  sku: {
    name: 'Free'
    tier: 'Free'
  }
  properties: {}
}

output SERVICE_WEB_ENDPOINT_URL string = 'https://${web.properties.defaultHostname}'
";

const PARAMETERS: &str = r#"{
  "$schema": "https://schema.management.azure.com/schemas/2019-04-01/deploymentParameters.json#",
  "contentVersion": "1.0.0.0",
  "parameters": {
    "environmentName": { "value": "${AZURE_ENV_NAME}" },
    "location": { "value": "${AZURE_LOCATION}" }
  }
}
"#;

/// Project name usable as a resource name
#[must_use]
pub fn project_name(repo: &Path) -> String {
    let raw = repo
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "shipwright-app".to_string()
    } else {
        trimmed.to_string()
    }
}

fn descriptor(name: &str) -> String {
    format!(
        "name: {name}\n\
         services:\n  \
           web:\n    \
             project: .\n    \
             language: js\n    \
             host: staticwebapp\n"
    )
}

/// Write the descriptor and infrastructure files that are missing
///
/// Returns the repository-relative paths written.
///
/// # Errors
/// I/O failure.
pub async fn scaffold(repo: &Path, descriptor_name: &str) -> std::io::Result<Vec<String>> {
    let files = [
        (descriptor_name.to_string(), descriptor(&project_name(repo))),
        ("infra/main.bicep".to_string(), BICEP.to_string()),
        ("infra/main.parameters.json".to_string(), PARAMETERS.to_string()),
    ];

    let mut written = Vec::new();
    for (rel, content) in files {
        let path = repo.join(&rel);
        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(path = %rel, "descriptor exists, kept");
            continue;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::info!(path = %rel, "descriptor scaffolded");
        written.push(rel);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_test_utils::fixtures::temp_tree;

    #[test]
    fn project_names_are_resource_safe() {
        assert_eq!(project_name(Path::new("/src/My Site_v2")), "my-site-v2");
        assert_eq!(project_name(Path::new("/")), "shipwright-app");
    }

    #[tokio::test]
    async fn scaffold_keeps_existing_files() {
        let dir = temp_tree(&[("infra/main.bicep", "// custom")]);
        let written = scaffold(dir.path(), "azure.yaml").await.unwrap();
        assert_eq!(written, ["azure.yaml", "infra/main.parameters.json"]);

        let bicep = std::fs::read_to_string(dir.path().join("infra/main.bicep")).unwrap();
        assert_eq!(bicep, "// custom");
        let yaml = std::fs::read_to_string(dir.path().join("azure.yaml")).unwrap();
        assert!(yaml.contains("host: staticwebapp"));
    }

    #[tokio::test]
    async fn scaffold_is_idempotent() {
        let dir = temp_tree(&[]);
        assert_eq!(scaffold(dir.path(), "azure.yaml").await.unwrap().len(), 3);
        assert!(scaffold(dir.path(), "azure.yaml").await.unwrap().is_empty());
    }
}
