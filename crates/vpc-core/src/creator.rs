//! The back-end the replayer drives.

use crate::error::ReplayError;
use crate::types::{
    ComputePipelineInput, DescriptorSetLayoutInput, GraphicsPipelineInput, Handle, Hash,
    PipelineLayoutInput, RenderPassCreateInfo, SamplerCreateInfo, ShaderModuleInput,
};

/// Receives fully materialized create-infos in dependency order during
/// replay and produces the live objects.
///
/// For each section the replayer calls `set_num_*` once, then
/// `enqueue_create_*` per element in index order, then [`wait_enqueue`]
/// before moving on, so a creator may batch work per section as long as
/// every handle is final by the time `wait_enqueue` returns. Handles
/// returned from `enqueue_create_*` are owned by the creator's caller.
///
/// [`wait_enqueue`]: StateCreator::wait_enqueue
pub trait StateCreator {
    fn set_num_shader_modules(&mut self, _count: usize) {}
    fn set_num_samplers(&mut self, _count: usize) {}
    fn set_num_descriptor_set_layouts(&mut self, _count: usize) {}
    fn set_num_pipeline_layouts(&mut self, _count: usize) {}
    fn set_num_render_passes(&mut self, _count: usize) {}
    fn set_num_compute_pipelines(&mut self, _count: usize) {}
    fn set_num_graphics_pipelines(&mut self, _count: usize) {}

    fn enqueue_create_shader_module(
        &mut self,
        hash: Hash,
        index: usize,
        info: &ShaderModuleInput<'_>,
    ) -> Result<Handle, ReplayError>;

    fn enqueue_create_sampler(
        &mut self,
        hash: Hash,
        index: usize,
        info: &SamplerCreateInfo,
    ) -> Result<Handle, ReplayError>;

    fn enqueue_create_descriptor_set_layout(
        &mut self,
        hash: Hash,
        index: usize,
        info: &DescriptorSetLayoutInput,
    ) -> Result<Handle, ReplayError>;

    fn enqueue_create_pipeline_layout(
        &mut self,
        hash: Hash,
        index: usize,
        info: &PipelineLayoutInput,
    ) -> Result<Handle, ReplayError>;

    fn enqueue_create_render_pass(
        &mut self,
        hash: Hash,
        index: usize,
        info: &RenderPassCreateInfo,
    ) -> Result<Handle, ReplayError>;

    fn enqueue_create_compute_pipeline(
        &mut self,
        hash: Hash,
        index: usize,
        info: &ComputePipelineInput<'_>,
    ) -> Result<Handle, ReplayError>;

    fn enqueue_create_graphics_pipeline(
        &mut self,
        hash: Hash,
        index: usize,
        info: &GraphicsPipelineInput<'_>,
    ) -> Result<Handle, ReplayError>;

    /// Section barrier: everything enqueued so far must be scheduled far
    /// enough that later sections may reference the produced handles.
    fn wait_enqueue(&mut self) -> Result<(), ReplayError> {
        Ok(())
    }
}
