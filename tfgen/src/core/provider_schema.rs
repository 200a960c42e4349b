//! Provider resource catalog parsed from `terraform providers schema -json`.
//!
//! Used to tell the generation agent which resource types it may use and which
//! arguments they cannot omit.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ProvidersSchema {
    #[serde(default)]
    provider_schemas: BTreeMap<String, ProviderSchema>,
}

#[derive(Debug, Deserialize)]
struct ProviderSchema {
    #[serde(default)]
    resource_schemas: BTreeMap<String, ResourceSchema>,
}

#[derive(Debug, Deserialize)]
struct ResourceSchema {
    #[serde(default)]
    block: Block,
}

#[derive(Debug, Default, Deserialize)]
struct Block {
    #[serde(default)]
    attributes: BTreeMap<String, Attribute>,
    #[serde(default)]
    block_types: BTreeMap<String, NestedBlock>,
}

#[derive(Debug, Deserialize)]
struct Attribute {
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Deserialize)]
struct NestedBlock {
    #[serde(default)]
    min_items: u64,
    #[serde(default)]
    block: Block,
}

/// Resource schemas of a single provider.
#[derive(Debug)]
pub struct ProviderCatalog {
    resources: BTreeMap<String, ResourceSchema>,
}

impl ProviderCatalog {
    /// Parse the JSON document and keep the resources of `provider_source`
    /// (e.g. `registry.terraform.io/hashicorp/google`).
    pub fn parse(json: &str, provider_source: &str) -> Result<Self> {
        let mut schema: ProvidersSchema =
            serde_json::from_str(json).context("parse providers schema json")?;
        let provider = schema
            .provider_schemas
            .remove(provider_source)
            .ok_or_else(|| anyhow!("provider '{provider_source}' not found in providers schema"))?;
        Ok(Self {
            resources: provider.resource_schemas,
        })
    }

    /// Resource type names (sorted) matching any of `prefixes`; all names when empty.
    pub fn resource_names(&self, prefixes: &[String]) -> Vec<String> {
        self.resources
            .keys()
            .filter(|name| prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p)))
            .cloned()
            .collect()
    }

    /// One rule per resource listing its mandatory arguments, followed by rules
    /// for required attributes of its nested blocks.
    pub fn required_argument_rules(&self, resources: &[String]) -> Result<Vec<String>> {
        let mut rules = Vec::new();
        for name in resources {
            let resource = self
                .resources
                .get(name)
                .ok_or_else(|| anyhow!("unknown resource type '{name}'"))?;
            let block = &resource.block;

            let mut required: Vec<&str> = block
                .block_types
                .iter()
                .filter(|(_, nested)| nested.min_items > 0)
                .map(|(key, _)| key.as_str())
                .collect();
            required.extend(
                block
                    .attributes
                    .iter()
                    .filter(|(_, attr)| attr.required)
                    .map(|(key, _)| key.as_str()),
            );
            rules.push(format!(
                "resource {name} requires {} as arguments.",
                required.join(",")
            ));

            for (block_name, nested) in &block.block_types {
                for (arg, attr) in &nested.block.attributes {
                    if attr.required {
                        rules.push(format!(
                            "If block {block_name} is used within {name} it requires the {arg} argument."
                        ));
                    }
                }
            }
        }
        Ok(rules)
    }
}
