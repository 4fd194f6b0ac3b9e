//! Static asset catalog
//!
//! The marketplace has no backing store; the catalog is a fixed list built
//! into the binary. Names are not unique (two `CODEMAKER` variants ship),
//! so identity is always the `id`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Stage,
    Workflow,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Stage => "stage",
            AssetKind::Workflow => "workflow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagColor {
    Pink,
    Cyan,
}

/// A reusable stage or workflow offered by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub category: String,
    pub owner: String,
    #[serde(default)]
    pub is_new: bool,
    pub tag: Option<String>,
    pub tag_color: Option<TagColor>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub pinned: bool,
}

impl Asset {
    fn new(id: &str, name: &str, description: &str, kind: AssetKind, category: &str, owner: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
            category: category.to_string(),
            owner: owner.to_string(),
            is_new: false,
            tag: None,
            tag_color: None,
            avatar: None,
            pinned: false,
        }
    }

    fn fresh(mut self) -> Self {
        self.is_new = true;
        self
    }

    fn tagged(mut self, tag: &str, color: TagColor, avatar: &str) -> Self {
        self.tag = Some(tag.to_string());
        self.tag_color = Some(color);
        self.avatar = Some(avatar.to_string());
        self
    }

    fn pin(mut self) -> Self {
        self.pinned = true;
        self
    }
}

/// Read-only list of assets, in display order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    assets: Vec<Asset>,
}

impl Catalog {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self { assets }
    }

    /// The catalog that ships with the hub
    pub fn builtin() -> Self {
        use AssetKind::{Stage, Workflow};
        use TagColor::{Cyan, Pink};

        Self::new(vec![
            Asset::new(
                "2",
                "SUBMIT_CHANGELIST",
                "Submits a changelist to version control. Essential for CI/CD pipelines.",
                Stage,
                "CI/CD",
                "jarvis-team",
            )
            .fresh()
            .tagged("Prod", Pink, "🤖")
            .pin(),
            Asset::new(
                "1",
                "CODEMAKER",
                "Generates code based on specifications. Highly reusable for various build processes.",
                Stage,
                "Build",
                "jarvis-team",
            )
            .fresh()
            .tagged("Non-prod", Cyan, "A")
            .pin(),
            Asset::new(
                "6",
                "CODEMAKER",
                "Production variant of the code generator stage.",
                Stage,
                "Build",
                "jarvis-team",
            )
            .tagged("Prod", Pink, "🧑‍💻"),
            Asset::new(
                "3",
                "UPDATE_DESCRIPTION",
                "Updates the description of a CL or a Buganizer issue.",
                Stage,
                "Tooling",
                "developer-tools",
            )
            .tagged("Prod", Pink, "🤖"),
            Asset::new(
                "4",
                "SYNC_GREEN_CL",
                "Syncs a \"green\" (passing tests) changelist to the main branch.",
                Workflow,
                "CI/CD",
                "jarvis-team",
            )
            .tagged("Non-prod", Cyan, "A"),
            Asset::new(
                "5",
                "CREATE_BUGANIZER_ISSUE",
                "Creates a new issue in Buganizer from workflow context.",
                Stage,
                "Tooling",
                "developer-tools",
            )
            .tagged("Prod", Pink, "🧑‍💻"),
            Asset::new(
                "7",
                "STANDARD_RELEASE_PIPELINE",
                "A complete workflow for a standard service release process.",
                Workflow,
                "Release",
                "sre-team",
            ),
            Asset::new(
                "8",
                "RUN_UNIT_TESTS",
                "Executes unit tests for a specified target.",
                Stage,
                "Testing",
                "testing-infra",
            ),
            Asset::new(
                "9",
                "DEPLOY_TO_STAGING",
                "Deploys a build to the staging environment.",
                Stage,
                "Release",
                "sre-team",
            ),
        ])
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// First asset whose name matches, ignoring case
    pub fn find_by_name(&self, name: &str) -> Option<&Asset> {
        let name = name.trim();
        self.assets.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Quoted, comma separated asset names for prompts
    pub fn name_list(&self) -> String {
        self.assets
            .iter()
            .map(|a| format!("'{}'", a.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
