//! Database collaborator.
//!
//! The supervisor only needs hash lists per resource kind to size the
//! workload; workers replay the documents themselves. The on-disk
//! container formats of a full pipeline-cache database stay out of scope,
//! so the bundled implementation reads serialized state documents.

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use vpc_core::document::StateDocument;
use vpc_core::types::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceTag {
    ShaderModule,
    Sampler,
    DescriptorSetLayout,
    PipelineLayout,
    RenderPass,
    GraphicsPipeline,
    ComputePipeline,
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to read database: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse database: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("database is not prepared")]
    NotPrepared,
}

pub trait Database {
    /// Load and validate the backing store. Must be called before any
    /// hash-list query.
    fn prepare(&mut self) -> Result<(), DatabaseError>;

    /// All recorded hashes for one resource kind, in index order.
    fn hash_list_for_tag(&self, tag: ResourceTag) -> Result<Vec<Hash>, DatabaseError>;
}

/// State documents on disk, in replay order.
pub struct JsonDatabase {
    paths: Vec<PathBuf>,
    documents: Vec<StateDocument>,
}

impl JsonDatabase {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            documents: Vec::new(),
        }
    }
}

impl Database for JsonDatabase {
    fn prepare(&mut self) -> Result<(), DatabaseError> {
        self.documents.clear();
        for path in &self.paths {
            let bytes = std::fs::read(path)?;
            let document = StateDocument::from_json(&bytes)?;
            debug!(
                path = %path.display(),
                graphics = document.graphics_pipelines.len(),
                compute = document.compute_pipelines.len(),
                "database prepared"
            );
            self.documents.push(document);
        }
        Ok(())
    }

    fn hash_list_for_tag(&self, tag: ResourceTag) -> Result<Vec<Hash>, DatabaseError> {
        if self.documents.len() != self.paths.len() {
            return Err(DatabaseError::NotPrepared);
        }
        let mut hashes = Vec::new();
        for document in &self.documents {
            match tag {
                ResourceTag::ShaderModule => {
                    hashes.extend(document.shader_modules.iter().map(|e| e.hash))
                }
                ResourceTag::Sampler => hashes.extend(document.samplers.iter().map(|e| e.hash)),
                ResourceTag::DescriptorSetLayout => {
                    hashes.extend(document.descriptor_set_layouts.iter().map(|e| e.hash))
                }
                ResourceTag::PipelineLayout => {
                    hashes.extend(document.pipeline_layouts.iter().map(|e| e.hash))
                }
                ResourceTag::RenderPass => {
                    hashes.extend(document.render_passes.iter().map(|e| e.hash))
                }
                ResourceTag::GraphicsPipeline => {
                    hashes.extend(document.graphics_pipelines.iter().map(|e| e.hash))
                }
                ResourceTag::ComputePipeline => {
                    hashes.extend(document.compute_pipelines.iter().map(|e| e.hash))
                }
            }
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_hash_lists_from_documents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "shaderModules": [ { "hash": 17, "flags": 0, "codeSize": 0, "code": "" } ],
                "graphicsPipelines": [],
                "computePipelines": []
            }"#,
        )
        .unwrap();

        let mut db = JsonDatabase::new(vec![file.path().to_path_buf()]);
        assert!(matches!(
            db.hash_list_for_tag(ResourceTag::ShaderModule),
            Err(DatabaseError::NotPrepared)
        ));

        db.prepare().unwrap();
        assert_eq!(db.hash_list_for_tag(ResourceTag::ShaderModule).unwrap(), vec![17]);
        assert!(db
            .hash_list_for_tag(ResourceTag::GraphicsPipeline)
            .unwrap()
            .is_empty());
    }
}
