#![allow(dead_code)]

use assetrun::config::{
    AssetConfig, Column, ColumnCheck, CustomCheck, DefaultSection, Pipeline, PipelineSection,
    RawPipelineFile, Upstream, UpstreamMode,
};

/// Asset type used by [`AssetBuilder`] unless overridden; pair it with
/// [`crate::fake_operator::registry_for`].
pub const TEST_ASSET_TYPE: &str = "test";

/// Builder for `Pipeline` to simplify test setup.
pub struct PipelineBuilder {
    raw: RawPipelineFile,
}

impl PipelineBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            raw: RawPipelineFile {
                pipeline: PipelineSection {
                    name: name.to_string(),
                    metadata_push: false,
                },
                default: DefaultSection::default(),
                asset: Vec::new(),
            },
        }
    }

    pub fn with_asset(mut self, asset: AssetConfig) -> Self {
        self.raw.asset.push(asset);
        self
    }

    pub fn with_metadata_push(mut self, enabled: bool) -> Self {
        self.raw.pipeline.metadata_push = enabled;
        self
    }

    pub fn raw(self) -> RawPipelineFile {
        self.raw
    }

    pub fn build(self) -> Pipeline {
        Pipeline::try_from(self.raw).expect("Failed to build valid pipeline from builder")
    }
}

/// Builder for `AssetConfig`.
pub struct AssetBuilder {
    asset: AssetConfig,
}

impl AssetBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            asset: AssetConfig {
                name: name.to_string(),
                asset_type: Some(TEST_ASSET_TYPE.to_string()),
                run: None,
                description: None,
                depends: vec![],
                tags: vec![],
                columns: vec![],
                custom_checks: vec![],
            },
        }
    }

    pub fn asset_type(mut self, asset_type: &str) -> Self {
        self.asset.asset_type = Some(asset_type.to_string());
        self
    }

    pub fn run(mut self, cmd: &str) -> Self {
        self.asset.run = Some(cmd.to_string());
        self
    }

    pub fn depends(mut self, upstream: &str) -> Self {
        self.asset.depends.push(Upstream::Name(upstream.to_string()));
        self
    }

    pub fn depends_symbolic(mut self, upstream: &str) -> Self {
        self.asset.depends.push(Upstream::Detailed {
            value: upstream.to_string(),
            kind: "asset".to_string(),
            mode: UpstreamMode::Symbolic,
        });
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.asset.tags.push(tag.to_string());
        self
    }

    /// Add a check to `column`, creating the column on first use.
    pub fn column_check(mut self, column: &str, check: &str, blocking: bool) -> Self {
        let check = ColumnCheck {
            name: check.to_string(),
            blocking,
            description: None,
        };

        match self.asset.columns.iter_mut().find(|c| c.name == column) {
            Some(existing) => existing.checks.push(check),
            None => self.asset.columns.push(Column {
                name: column.to_string(),
                checks: vec![check],
            }),
        }
        self
    }

    pub fn custom_check(self, name: &str, blocking: bool) -> Self {
        self.push_custom_check(name, None, blocking)
    }

    pub fn custom_check_query(self, name: &str, query: &str, blocking: bool) -> Self {
        self.push_custom_check(name, Some(query.to_string()), blocking)
    }

    fn push_custom_check(mut self, name: &str, query: Option<String>, blocking: bool) -> Self {
        self.asset.custom_checks.push(CustomCheck {
            name: name.to_string(),
            query,
            blocking,
            description: None,
        });
        self
    }

    pub fn build(self) -> AssetConfig {
        self.asset
    }
}

/// Pipeline with assets `a`, `b`, `c` where `b` and `c` depend on `a`.
pub fn fan_out_pipeline() -> Pipeline {
    PipelineBuilder::new("fan_out")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .with_asset(AssetBuilder::new("c").depends("a").build())
        .build()
}

/// Linear chain `a -> b -> c`.
pub fn chain_pipeline() -> Pipeline {
    PipelineBuilder::new("chain")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .with_asset(AssetBuilder::new("c").depends("b").build())
        .build()
}
