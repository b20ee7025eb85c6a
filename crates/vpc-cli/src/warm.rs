//! Cache-warming creator for slave mode.
//!
//! Stands where a GPU driver back-end would: it accepts every create-info
//! the replayer materializes, hands out session-local handles and walks
//! the same validation the real back-end would trip over first (the
//! SPIR-V magic word). Created pipeline hashes can be persisted to an
//! on-disk cache file so repeated runs can tell what they already warmed.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use vpc_core::types::*;
use vpc_core::{ReplayError, StateCreator};

const SPIRV_MAGIC: u32 = 0x0723_0203;

pub struct CacheWarmCreator {
    next_handle: u64,
    spirv_validate: bool,
    /// When set, pipeline hashes already seen are not re-created.
    dedupe: Option<HashSet<Hash>>,
    on_disk_cache: Option<PathBuf>,
    pub pipelines_created: usize,
}

impl CacheWarmCreator {
    pub fn new(spirv_validate: bool, pipeline_cache: bool, on_disk_cache: Option<PathBuf>) -> Self {
        Self {
            next_handle: 0,
            spirv_validate,
            dedupe: pipeline_cache.then(HashSet::new),
            on_disk_cache,
            pipelines_created: 0,
        }
    }

    fn next(&mut self) -> Handle {
        self.next_handle += 1;
        Handle(self.next_handle)
    }

    fn already_cached(&mut self, hash: Hash) -> bool {
        match &mut self.dedupe {
            Some(seen) => !seen.insert(hash),
            None => false,
        }
    }

    fn persist(&mut self, hash: Hash) -> Result<(), ReplayError> {
        self.pipelines_created += 1;
        if let Some(path) = &self.on_disk_cache {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ReplayError::Creation(e.to_string()))?;
            writeln!(file, "{hash:016x}").map_err(|e| ReplayError::Creation(e.to_string()))?;
        }
        Ok(())
    }
}

impl StateCreator for CacheWarmCreator {
    fn enqueue_create_shader_module(
        &mut self,
        hash: Hash,
        index: usize,
        info: &ShaderModuleInput<'_>,
    ) -> Result<Handle, ReplayError> {
        if self.spirv_validate {
            let magic = info
                .code
                .get(..4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            if magic != Some(SPIRV_MAGIC) {
                warn!(
                    module = format_args!("{hash:x}"),
                    index, "rejecting module without SPIR-V magic word"
                );
                return Ok(Handle::NULL);
            }
        }
        Ok(self.next())
    }

    fn enqueue_create_sampler(
        &mut self,
        _hash: Hash,
        _index: usize,
        _info: &SamplerCreateInfo,
    ) -> Result<Handle, ReplayError> {
        Ok(self.next())
    }

    fn enqueue_create_descriptor_set_layout(
        &mut self,
        _hash: Hash,
        _index: usize,
        _info: &DescriptorSetLayoutInput,
    ) -> Result<Handle, ReplayError> {
        Ok(self.next())
    }

    fn enqueue_create_pipeline_layout(
        &mut self,
        _hash: Hash,
        _index: usize,
        _info: &PipelineLayoutInput,
    ) -> Result<Handle, ReplayError> {
        Ok(self.next())
    }

    fn enqueue_create_render_pass(
        &mut self,
        _hash: Hash,
        _index: usize,
        _info: &RenderPassCreateInfo,
    ) -> Result<Handle, ReplayError> {
        Ok(self.next())
    }

    fn enqueue_create_compute_pipeline(
        &mut self,
        hash: Hash,
        index: usize,
        _info: &ComputePipelineInput<'_>,
    ) -> Result<Handle, ReplayError> {
        if self.already_cached(hash) {
            debug!(index, "compute pipeline already cached");
            return Ok(self.next());
        }
        self.persist(hash)?;
        Ok(self.next())
    }

    fn enqueue_create_graphics_pipeline(
        &mut self,
        hash: Hash,
        index: usize,
        _info: &GraphicsPipelineInput<'_>,
    ) -> Result<Handle, ReplayError> {
        if self.already_cached(hash) {
            debug!(index, "graphics pipeline already cached");
            return Ok(self.next());
        }
        self.persist(hash)?;
        Ok(self.next())
    }
}
