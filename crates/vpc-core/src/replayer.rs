//! Reconstruction of recorded state against a [`StateCreator`] back-end.

use crate::arena::{ByteRange, ScratchAllocator};
use crate::creator::StateCreator;
use crate::document::{
    decode_blob, ComputePipelineEntry, DescriptorSetLayoutEntry, GraphicsPipelineEntry,
    PipelineLayoutEntry, RenderPassEntry, SamplerEntry, ShaderModuleEntry,
    SpecializationInfoEntry, StageEntry, StateDocument,
};
use crate::error::ReplayError;
use crate::types::*;

/// Resolve a stored reference against the handles replayed so far.
/// `0` is null; `[1, prior.len()]` selects a prior element; anything
/// larger is rejected.
fn resolve_ref(
    prior: &[Handle],
    stored: ResourceRef,
    section: &'static str,
) -> Result<Handle, ReplayError> {
    match stored.index() {
        None => Ok(Handle::NULL),
        Some(index) if index < prior.len() => Ok(prior[index]),
        Some(_) => Err(ReplayError::IndexOutOfRange {
            section,
            stored: stored.0,
            len: prior.len(),
        }),
    }
}

/// Parses a state document and materializes each section in dependency
/// order: shader modules and samplers first, then descriptor-set layouts,
/// then pipeline layouts and render passes, then compute and graphics
/// pipelines. Blob payloads are decoded into the replayer's arena, which
/// outlives every create-info handed to the creator within a `parse` call.
///
/// A structural error aborts the call; sections already enqueued stay
/// visible to the creator.
#[derive(Default)]
pub struct StateReplayer {
    allocator: ScratchAllocator,
    replayed_shader_modules: Vec<Handle>,
    replayed_samplers: Vec<Handle>,
    replayed_descriptor_set_layouts: Vec<Handle>,
    replayed_pipeline_layouts: Vec<Handle>,
    replayed_render_passes: Vec<Handle>,
    replayed_compute_pipelines: Vec<Handle>,
    replayed_graphics_pipelines: Vec<Handle>,
}

/// Decoded specialization payload waiting for view construction.
struct SpecParts {
    data: ByteRange,
    map_entries: Vec<SpecializationMapEntry>,
}

fn decode_spec_info(
    allocator: &mut ScratchAllocator,
    entry: &SpecializationInfoEntry,
) -> Result<SpecParts, ReplayError> {
    let decoded = decode_blob(&entry.code)?;
    if decoded.len() as u64 != entry.data_size {
        return Err(ReplayError::BlobSize {
            declared: entry.data_size,
            actual: decoded.len(),
        });
    }
    let data = allocator
        .write_bytes(&decoded)
        .ok_or(ReplayError::AllocationFailed)?;
    Ok(SpecParts {
        data,
        map_entries: entry.map_entries.clone(),
    })
}

impl StateReplayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse<C: StateCreator + ?Sized>(
        &mut self,
        creator: &mut C,
        bytes: &[u8],
    ) -> Result<(), ReplayError> {
        let document = StateDocument::from_json(bytes)?;
        tracing::debug!(
            shader_modules = document.shader_modules.len(),
            graphics_pipelines = document.graphics_pipelines.len(),
            compute_pipelines = document.compute_pipelines.len(),
            "state document parsed"
        );
        self.parse_shader_modules(creator, &document.shader_modules)?;
        self.parse_samplers(creator, &document.samplers)?;
        self.parse_descriptor_set_layouts(creator, &document.descriptor_set_layouts)?;
        self.parse_pipeline_layouts(creator, &document.pipeline_layouts)?;
        self.parse_render_passes(creator, &document.render_passes)?;
        self.parse_compute_pipelines(creator, &document.compute_pipelines)?;
        self.parse_graphics_pipelines(creator, &document.graphics_pipelines)?;
        Ok(())
    }

    fn parse_shader_modules<C: StateCreator + ?Sized>(
        &mut self,
        creator: &mut C,
        entries: &[ShaderModuleEntry],
    ) -> Result<(), ReplayError> {
        creator.set_num_shader_modules(entries.len());
        self.replayed_shader_modules.reserve(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let decoded = decode_blob(&entry.code)?;
            if decoded.len() as u64 != entry.code_size {
                return Err(ReplayError::BlobSize {
                    declared: entry.code_size,
                    actual: decoded.len(),
                });
            }
            let code = self
                .allocator
                .write_bytes_aligned(&decoded, 4)
                .ok_or(ReplayError::AllocationFailed)?;
            let info = ShaderModuleCreateInfo {
                flags: entry.flags,
                code: self.allocator.bytes(code),
            };
            let handle = creator.enqueue_create_shader_module(entry.hash, index, &info)?;
            self.replayed_shader_modules.push(handle);
        }
        creator.wait_enqueue()
    }

    fn parse_samplers<C: StateCreator + ?Sized>(
        &mut self,
        creator: &mut C,
        entries: &[SamplerEntry],
    ) -> Result<(), ReplayError> {
        creator.set_num_samplers(entries.len());
        self.replayed_samplers.reserve(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let handle = creator.enqueue_create_sampler(entry.hash, index, &entry.info)?;
            self.replayed_samplers.push(handle);
        }
        creator.wait_enqueue()
    }

    fn parse_descriptor_set_layouts<C: StateCreator + ?Sized>(
        &mut self,
        creator: &mut C,
        entries: &[DescriptorSetLayoutEntry],
    ) -> Result<(), ReplayError> {
        creator.set_num_descriptor_set_layouts(entries.len());
        self.replayed_descriptor_set_layouts.reserve(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let bindings = entry
                .info
                .bindings
                .iter()
                .map(|binding| {
                    let immutable_samplers = binding
                        .immutable_samplers
                        .as_ref()
                        .map(|samplers| {
                            samplers
                                .iter()
                                .map(|&s| resolve_ref(&self.replayed_samplers, s, "samplers"))
                                .collect::<Result<Vec<_>, _>>()
                        })
                        .transpose()?;
                    Ok(DescriptorSetLayoutBinding {
                        binding: binding.binding,
                        descriptor_type: binding.descriptor_type,
                        descriptor_count: binding.descriptor_count,
                        stage_flags: binding.stage_flags,
                        immutable_samplers,
                    })
                })
                .collect::<Result<Vec<_>, ReplayError>>()?;

            let info = DescriptorSetLayoutCreateInfo {
                flags: entry.info.flags,
                bindings,
            };
            let handle = creator.enqueue_create_descriptor_set_layout(entry.hash, index, &info)?;
            self.replayed_descriptor_set_layouts.push(handle);
        }
        creator.wait_enqueue()
    }

    fn parse_pipeline_layouts<C: StateCreator + ?Sized>(
        &mut self,
        creator: &mut C,
        entries: &[PipelineLayoutEntry],
    ) -> Result<(), ReplayError> {
        creator.set_num_pipeline_layouts(entries.len());
        self.replayed_pipeline_layouts.reserve(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let set_layouts = entry
                .info
                .set_layouts
                .iter()
                .map(|&l| {
                    resolve_ref(
                        &self.replayed_descriptor_set_layouts,
                        l,
                        "descriptorSetLayouts",
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;

            let info = PipelineLayoutCreateInfo {
                flags: entry.info.flags,
                set_layouts,
                push_constant_ranges: entry.info.push_constant_ranges.clone(),
            };
            let handle = creator.enqueue_create_pipeline_layout(entry.hash, index, &info)?;
            self.replayed_pipeline_layouts.push(handle);
        }
        creator.wait_enqueue()
    }

    fn parse_render_passes<C: StateCreator + ?Sized>(
        &mut self,
        creator: &mut C,
        entries: &[RenderPassEntry],
    ) -> Result<(), ReplayError> {
        creator.set_num_render_passes(entries.len());
        self.replayed_render_passes.reserve(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let handle = creator.enqueue_create_render_pass(entry.hash, index, &entry.info)?;
            self.replayed_render_passes.push(handle);
        }
        creator.wait_enqueue()
    }

    fn parse_compute_pipelines<C: StateCreator + ?Sized>(
        &mut self,
        creator: &mut C,
        entries: &[ComputePipelineEntry],
    ) -> Result<(), ReplayError> {
        creator.set_num_compute_pipelines(entries.len());
        self.replayed_compute_pipelines.reserve(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let spec = entry
                .stage
                .specialization_info
                .as_ref()
                .map(|s| decode_spec_info(&mut self.allocator, s))
                .transpose()?;

            let stage = build_stage_view(
                &self.allocator,
                &self.replayed_shader_modules,
                &entry.stage,
                &spec,
            )?;
            let info = ComputePipelineCreateInfo {
                flags: entry.flags,
                stage,
                layout: resolve_ref(&self.replayed_pipeline_layouts, entry.layout, "pipelineLayouts")?,
                base_pipeline: resolve_ref(
                    &self.replayed_compute_pipelines,
                    entry.base_pipeline_handle,
                    "computePipelines",
                )?,
                base_pipeline_index: entry.base_pipeline_index,
            };
            let handle = creator.enqueue_create_compute_pipeline(entry.hash, index, &info)?;
            self.replayed_compute_pipelines.push(handle);
        }
        creator.wait_enqueue()
    }

    fn parse_graphics_pipelines<C: StateCreator + ?Sized>(
        &mut self,
        creator: &mut C,
        entries: &[GraphicsPipelineEntry],
    ) -> Result<(), ReplayError> {
        creator.set_num_graphics_pipelines(entries.len());
        self.replayed_graphics_pipelines.reserve(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            // Decode every stage payload before building borrowed views, so
            // the arena is not mutated while views point into it.
            let specs = entry
                .stages
                .iter()
                .map(|stage| {
                    stage
                        .specialization_info
                        .as_ref()
                        .map(|s| decode_spec_info(&mut self.allocator, s))
                        .transpose()
                })
                .collect::<Result<Vec<_>, _>>()?;

            let stages = entry
                .stages
                .iter()
                .zip(&specs)
                .map(|(stage, spec)| {
                    build_stage_view(
                        &self.allocator,
                        &self.replayed_shader_modules,
                        stage,
                        spec,
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;

            let info = GraphicsPipelineCreateInfo {
                flags: entry.flags,
                stages,
                vertex_input_state: entry.vertex_input_state.clone(),
                input_assembly_state: entry.input_assembly_state,
                tessellation_state: entry.tessellation_state,
                viewport_state: entry.viewport_state.clone(),
                rasterization_state: entry.rasterization_state,
                multisample_state: entry.multisample_state.clone(),
                depth_stencil_state: entry.depth_stencil_state,
                color_blend_state: entry.color_blend_state.clone(),
                dynamic_state: entry.dynamic_state.clone(),
                layout: resolve_ref(&self.replayed_pipeline_layouts, entry.layout, "pipelineLayouts")?,
                render_pass: resolve_ref(&self.replayed_render_passes, entry.render_pass, "renderPasses")?,
                subpass: entry.subpass,
                base_pipeline: resolve_ref(
                    &self.replayed_graphics_pipelines,
                    entry.base_pipeline_handle,
                    "graphicsPipelines",
                )?,
                base_pipeline_index: entry.base_pipeline_index,
            };
            let handle = creator.enqueue_create_graphics_pipeline(entry.hash, index, &info)?;
            self.replayed_graphics_pipelines.push(handle);
        }
        creator.wait_enqueue()
    }
}

fn build_stage_view<'a>(
    allocator: &'a ScratchAllocator,
    replayed_modules: &[Handle],
    stage: &StageEntry,
    spec: &Option<SpecParts>,
) -> Result<ShaderStageInfo<Handle, &'a [u8]>, ReplayError> {
    Ok(ShaderStageInfo {
        flags: stage.flags,
        stage: stage.stage,
        module: resolve_ref(replayed_modules, stage.module, "shaderModules")?,
        name: stage.name.clone(),
        specialization_info: spec.as_ref().map(|parts| SpecializationInfo {
            data: allocator.bytes(parts.data),
            map_entries: parts.map_entries.clone(),
        }),
    })
}
