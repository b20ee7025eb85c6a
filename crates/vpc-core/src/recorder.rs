//! Append-only capture of pipeline-creation descriptors.

use std::collections::HashMap;

use crate::arena::ScratchAllocator;
use crate::document::{
    encode_blob, ComputePipelineEntry, DescriptorSetLayoutEntry, GraphicsPipelineEntry,
    PipelineLayoutEntry, RenderPassEntry, SamplerEntry, ShaderModuleEntry,
    SpecializationInfoEntry, StageEntry, StateDocument,
};
use crate::error::RecordError;
use crate::types::{vk, *};

/// Registers descriptors by value, deduplicating nothing itself: the caller
/// computes the [`Hash`] (see [`crate::hashing`]) and decides whether to
/// register. Registration copies every sub-buffer into the arena, rewrites
/// handle references into stable indices and appends to the per-kind list.
/// Indices are dense, zero-based and stable for the recorder's lifetime.
///
/// Producers must be registered before consumers: hashing and registration
/// both resolve child handles eagerly and fail with
/// [`RecordError::UnknownHandle`] otherwise.
///
/// Single-writer. Wrap in a lock if multiple threads capture concurrently.
#[derive(Default)]
pub struct StateRecorder {
    allocator: ScratchAllocator,

    shader_modules: Vec<(Hash, ShaderModuleDesc)>,
    samplers: Vec<(Hash, SamplerCreateInfo)>,
    descriptor_set_layouts: Vec<(Hash, DescriptorSetLayoutDesc)>,
    pipeline_layouts: Vec<(Hash, PipelineLayoutDesc)>,
    render_passes: Vec<(Hash, RenderPassCreateInfo)>,
    compute_pipelines: Vec<(Hash, ComputePipelineDesc)>,
    graphics_pipelines: Vec<(Hash, GraphicsPipelineDesc)>,

    shader_module_to_index: HashMap<Handle, usize>,
    sampler_to_index: HashMap<Handle, usize>,
    descriptor_set_layout_to_index: HashMap<Handle, usize>,
    pipeline_layout_to_index: HashMap<Handle, usize>,
    render_pass_to_index: HashMap<Handle, usize>,
    compute_pipeline_to_index: HashMap<Handle, usize>,
    graphics_pipeline_to_index: HashMap<Handle, usize>,
}

fn lookup(
    map: &HashMap<Handle, usize>,
    handle: Handle,
    kind: &'static str,
) -> Result<usize, RecordError> {
    map.get(&handle).copied().ok_or(RecordError::UnknownHandle {
        kind,
        handle: handle.0,
    })
}

/// Null handles become null refs; non-null handles must be registered.
fn resolve(
    map: &HashMap<Handle, usize>,
    handle: Handle,
    kind: &'static str,
) -> Result<ResourceRef, RecordError> {
    if handle.is_null() {
        Ok(ResourceRef::NULL)
    } else {
        Ok(ResourceRef::from_index(lookup(map, handle, kind)?))
    }
}

impl StateRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Handle bookkeeping ───────────────────────────────────

    pub fn set_shader_module_handle(&mut self, index: usize, handle: Handle) {
        self.shader_module_to_index.insert(handle, index);
    }

    pub fn set_sampler_handle(&mut self, index: usize, handle: Handle) {
        self.sampler_to_index.insert(handle, index);
    }

    pub fn set_descriptor_set_layout_handle(&mut self, index: usize, handle: Handle) {
        self.descriptor_set_layout_to_index.insert(handle, index);
    }

    pub fn set_pipeline_layout_handle(&mut self, index: usize, handle: Handle) {
        self.pipeline_layout_to_index.insert(handle, index);
    }

    pub fn set_render_pass_handle(&mut self, index: usize, handle: Handle) {
        self.render_pass_to_index.insert(handle, index);
    }

    pub fn set_compute_pipeline_handle(&mut self, index: usize, handle: Handle) {
        self.compute_pipeline_to_index.insert(handle, index);
    }

    pub fn set_graphics_pipeline_handle(&mut self, index: usize, handle: Handle) {
        self.graphics_pipeline_to_index.insert(handle, index);
    }

    // ── Hash lookup by handle ────────────────────────────────

    pub fn get_shader_module_hash(&self, handle: Handle) -> Result<Hash, RecordError> {
        lookup(&self.shader_module_to_index, handle, "shader module")
            .map(|i| self.shader_modules[i].0)
    }

    pub fn get_sampler_hash(&self, handle: Handle) -> Result<Hash, RecordError> {
        lookup(&self.sampler_to_index, handle, "sampler").map(|i| self.samplers[i].0)
    }

    pub fn get_descriptor_set_layout_hash(&self, handle: Handle) -> Result<Hash, RecordError> {
        lookup(
            &self.descriptor_set_layout_to_index,
            handle,
            "descriptor set layout",
        )
        .map(|i| self.descriptor_set_layouts[i].0)
    }

    pub fn get_pipeline_layout_hash(&self, handle: Handle) -> Result<Hash, RecordError> {
        lookup(&self.pipeline_layout_to_index, handle, "pipeline layout")
            .map(|i| self.pipeline_layouts[i].0)
    }

    pub fn get_render_pass_hash(&self, handle: Handle) -> Result<Hash, RecordError> {
        lookup(&self.render_pass_to_index, handle, "render pass").map(|i| self.render_passes[i].0)
    }

    pub fn get_compute_pipeline_hash(&self, handle: Handle) -> Result<Hash, RecordError> {
        lookup(&self.compute_pipeline_to_index, handle, "compute pipeline")
            .map(|i| self.compute_pipelines[i].0)
    }

    pub fn get_graphics_pipeline_hash(&self, handle: Handle) -> Result<Hash, RecordError> {
        lookup(
            &self.graphics_pipeline_to_index,
            handle,
            "graphics pipeline",
        )
        .map(|i| self.graphics_pipelines[i].0)
    }

    // ── Registration ─────────────────────────────────────────

    pub fn register_shader_module(
        &mut self,
        hash: Hash,
        info: &ShaderModuleInput<'_>,
    ) -> Result<usize, RecordError> {
        // SPIR-V payloads are u32 words; keep them word-aligned in the arena.
        let code = self
            .allocator
            .write_bytes_aligned(info.code, 4)
            .ok_or(RecordError::AllocationFailed)?;
        let index = self.shader_modules.len();
        self.shader_modules.push((
            hash,
            ShaderModuleCreateInfo {
                flags: info.flags,
                code,
            },
        ));
        Ok(index)
    }

    pub fn register_sampler(&mut self, hash: Hash, info: &SamplerCreateInfo) -> usize {
        let index = self.samplers.len();
        self.samplers.push((hash, *info));
        index
    }

    pub fn register_descriptor_set_layout(
        &mut self,
        hash: Hash,
        info: &DescriptorSetLayoutInput,
    ) -> Result<usize, RecordError> {
        let mut bindings = Vec::with_capacity(info.bindings.len());
        for binding in &info.bindings {
            // Immutable samplers only exist for the two sampler-bearing
            // descriptor types; anything else is dropped on copy.
            let immutable_samplers = match &binding.immutable_samplers {
                Some(samplers)
                    if binding.descriptor_type == vk::DESCRIPTOR_TYPE_SAMPLER
                        || binding.descriptor_type == vk::DESCRIPTOR_TYPE_COMBINED_IMAGE_SAMPLER =>
                {
                    Some(
                        samplers
                            .iter()
                            .map(|&s| resolve(&self.sampler_to_index, s, "sampler"))
                            .collect::<Result<Vec<_>, _>>()?,
                    )
                }
                _ => None,
            };
            bindings.push(DescriptorSetLayoutBinding {
                binding: binding.binding,
                descriptor_type: binding.descriptor_type,
                descriptor_count: binding.descriptor_count,
                stage_flags: binding.stage_flags,
                immutable_samplers,
            });
        }

        let index = self.descriptor_set_layouts.len();
        self.descriptor_set_layouts.push((
            hash,
            DescriptorSetLayoutCreateInfo {
                flags: info.flags,
                bindings,
            },
        ));
        Ok(index)
    }

    pub fn register_pipeline_layout(
        &mut self,
        hash: Hash,
        info: &PipelineLayoutInput,
    ) -> Result<usize, RecordError> {
        let set_layouts = info
            .set_layouts
            .iter()
            .map(|&l| {
                resolve(
                    &self.descriptor_set_layout_to_index,
                    l,
                    "descriptor set layout",
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let index = self.pipeline_layouts.len();
        self.pipeline_layouts.push((
            hash,
            PipelineLayoutCreateInfo {
                flags: info.flags,
                set_layouts,
                push_constant_ranges: info.push_constant_ranges.clone(),
            },
        ));
        Ok(index)
    }

    pub fn register_render_pass(&mut self, hash: Hash, info: &RenderPassCreateInfo) -> usize {
        let index = self.render_passes.len();
        self.render_passes.push((hash, info.clone()));
        index
    }

    fn copy_stage(
        &mut self,
        stage: &ShaderStageInfo<Handle, &[u8]>,
    ) -> Result<ShaderStageInfo<ResourceRef, crate::arena::ByteRange>, RecordError> {
        let module = resolve(&self.shader_module_to_index, stage.module, "shader module")?;
        let specialization_info = match &stage.specialization_info {
            Some(spec) => Some(SpecializationInfo {
                data: self
                    .allocator
                    .write_bytes(spec.data)
                    .ok_or(RecordError::AllocationFailed)?,
                map_entries: spec.map_entries.clone(),
            }),
            None => None,
        };
        Ok(ShaderStageInfo {
            flags: stage.flags,
            stage: stage.stage,
            module,
            name: stage.name.clone(),
            specialization_info,
        })
    }

    pub fn register_compute_pipeline(
        &mut self,
        hash: Hash,
        info: &ComputePipelineInput<'_>,
    ) -> Result<usize, RecordError> {
        let stage = self.copy_stage(&info.stage)?;
        let layout = resolve(&self.pipeline_layout_to_index, info.layout, "pipeline layout")?;
        let base_pipeline = resolve(
            &self.compute_pipeline_to_index,
            info.base_pipeline,
            "compute pipeline",
        )?;

        let index = self.compute_pipelines.len();
        self.compute_pipelines.push((
            hash,
            ComputePipelineCreateInfo {
                flags: info.flags,
                stage,
                layout,
                base_pipeline,
                base_pipeline_index: info.base_pipeline_index,
            },
        ));
        Ok(index)
    }

    pub fn register_graphics_pipeline(
        &mut self,
        hash: Hash,
        info: &GraphicsPipelineInput<'_>,
    ) -> Result<usize, RecordError> {
        let stages = info
            .stages
            .iter()
            .map(|s| self.copy_stage(s))
            .collect::<Result<Vec<_>, _>>()?;
        let layout = resolve(&self.pipeline_layout_to_index, info.layout, "pipeline layout")?;
        let render_pass = resolve(&self.render_pass_to_index, info.render_pass, "render pass")?;
        let base_pipeline = resolve(
            &self.graphics_pipeline_to_index,
            info.base_pipeline,
            "graphics pipeline",
        )?;

        let index = self.graphics_pipelines.len();
        self.graphics_pipelines.push((
            hash,
            GraphicsPipelineCreateInfo {
                flags: info.flags,
                stages,
                vertex_input_state: info.vertex_input_state.clone(),
                input_assembly_state: info.input_assembly_state,
                tessellation_state: info.tessellation_state,
                viewport_state: info.viewport_state.clone(),
                rasterization_state: info.rasterization_state,
                multisample_state: info.multisample_state.clone(),
                depth_stencil_state: info.depth_stencil_state,
                color_blend_state: info.color_blend_state.clone(),
                dynamic_state: info.dynamic_state.clone(),
                layout,
                render_pass,
                subpass: info.subpass,
                base_pipeline,
                base_pipeline_index: info.base_pipeline_index,
            },
        ));
        Ok(index)
    }

    /// Stored form of a registered descriptor-set layout.
    pub fn descriptor_set_layout_desc(&self, index: usize) -> &DescriptorSetLayoutDesc {
        &self.descriptor_set_layouts[index].1
    }

    // ── Serialization ────────────────────────────────────────

    fn stage_entry(&self, stage: &ShaderStageInfo<ResourceRef, crate::arena::ByteRange>) -> StageEntry {
        StageEntry {
            flags: stage.flags,
            name: stage.name.clone(),
            module: stage.module,
            stage: stage.stage,
            specialization_info: stage.specialization_info.as_ref().map(|spec| {
                SpecializationInfoEntry {
                    data_size: spec.data.len() as u64,
                    code: encode_blob(self.allocator.bytes(spec.data)),
                    map_entries: spec.map_entries.clone(),
                }
            }),
        }
    }

    /// Pure snapshot of the recorded graph. Walks every list in index
    /// order; repeated calls on unchanged state yield identical bytes.
    pub fn serialize(&self) -> Result<String, RecordError> {
        tracing::debug!(
            shader_modules = self.shader_modules.len(),
            samplers = self.samplers.len(),
            graphics_pipelines = self.graphics_pipelines.len(),
            compute_pipelines = self.compute_pipelines.len(),
            "serializing state document"
        );
        let document = StateDocument {
            shader_modules: self
                .shader_modules
                .iter()
                .map(|(hash, info)| ShaderModuleEntry {
                    hash: *hash,
                    flags: info.flags,
                    code_size: info.code.len() as u64,
                    code: encode_blob(self.allocator.bytes(info.code)),
                })
                .collect(),
            samplers: self
                .samplers
                .iter()
                .map(|(hash, info)| SamplerEntry {
                    hash: *hash,
                    info: *info,
                })
                .collect(),
            descriptor_set_layouts: self
                .descriptor_set_layouts
                .iter()
                .map(|(hash, info)| DescriptorSetLayoutEntry {
                    hash: *hash,
                    info: info.clone(),
                })
                .collect(),
            pipeline_layouts: self
                .pipeline_layouts
                .iter()
                .map(|(hash, info)| PipelineLayoutEntry {
                    hash: *hash,
                    info: info.clone(),
                })
                .collect(),
            render_passes: self
                .render_passes
                .iter()
                .map(|(hash, info)| RenderPassEntry {
                    hash: *hash,
                    info: info.clone(),
                })
                .collect(),
            compute_pipelines: self
                .compute_pipelines
                .iter()
                .map(|(hash, info)| ComputePipelineEntry {
                    hash: *hash,
                    flags: info.flags,
                    layout: info.layout,
                    base_pipeline_handle: info.base_pipeline,
                    base_pipeline_index: info.base_pipeline_index,
                    stage: self.stage_entry(&info.stage),
                })
                .collect(),
            graphics_pipelines: self
                .graphics_pipelines
                .iter()
                .map(|(hash, info)| GraphicsPipelineEntry {
                    hash: *hash,
                    flags: info.flags,
                    base_pipeline_handle: info.base_pipeline,
                    base_pipeline_index: info.base_pipeline_index,
                    layout: info.layout,
                    render_pass: info.render_pass,
                    subpass: info.subpass,
                    vertex_input_state: info.vertex_input_state.clone(),
                    input_assembly_state: info.input_assembly_state,
                    tessellation_state: info.tessellation_state,
                    viewport_state: info.viewport_state.clone(),
                    rasterization_state: info.rasterization_state,
                    multisample_state: info.multisample_state.clone(),
                    depth_stencil_state: info.depth_stencil_state,
                    color_blend_state: info.color_blend_state.clone(),
                    dynamic_state: info.dynamic_state.clone(),
                    stages: info.stages.iter().map(|s| self.stage_entry(s)).collect(),
                })
                .collect(),
        };

        Ok(document.to_json_pretty()?)
    }
}
