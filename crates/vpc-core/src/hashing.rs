//! Canonical per-descriptor fingerprints.
//!
//! Every field that affects pipeline compilation is fed to the [`Hasher`]
//! in a fixed order; referenced descriptors contribute their recorded hash
//! rather than their handle bits, so fingerprints are stable across
//! processes. Absent optional sub-states contribute a `u32(0)` sentinel.
//!
//! Dynamic-state gating: values that the application supplies at
//! command-recording time (viewports, scissors, line width, depth bias,
//! depth bounds, stencil masks, blend constants) are excluded from the
//! fingerprint when the corresponding dynamic toggle is enabled. Two
//! pipelines that differ only in state the driver never compiles in must
//! fingerprint identically. The toggle set is extracted in a first pass
//! over the dynamic sub-state and consulted throughout the traversal.

use bitflags::bitflags;

use crate::error::RecordError;
use crate::hasher::Hasher;
use crate::recorder::StateRecorder;
use crate::types::{vk, *};

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    struct DynamicToggles: u32 {
        const VIEWPORT = 1 << 0;
        const SCISSOR = 1 << 1;
        const LINE_WIDTH = 1 << 2;
        const DEPTH_BIAS = 1 << 3;
        const BLEND_CONSTANTS = 1 << 4;
        const DEPTH_BOUNDS = 1 << 5;
        const STENCIL_COMPARE_MASK = 1 << 6;
        const STENCIL_WRITE_MASK = 1 << 7;
        const STENCIL_REFERENCE = 1 << 8;
    }
}

impl DynamicToggles {
    fn from_state(state: u32) -> DynamicToggles {
        match state {
            vk::DYNAMIC_STATE_VIEWPORT => DynamicToggles::VIEWPORT,
            vk::DYNAMIC_STATE_SCISSOR => DynamicToggles::SCISSOR,
            vk::DYNAMIC_STATE_LINE_WIDTH => DynamicToggles::LINE_WIDTH,
            vk::DYNAMIC_STATE_DEPTH_BIAS => DynamicToggles::DEPTH_BIAS,
            vk::DYNAMIC_STATE_BLEND_CONSTANTS => DynamicToggles::BLEND_CONSTANTS,
            vk::DYNAMIC_STATE_DEPTH_BOUNDS => DynamicToggles::DEPTH_BOUNDS,
            vk::DYNAMIC_STATE_STENCIL_COMPARE_MASK => DynamicToggles::STENCIL_COMPARE_MASK,
            vk::DYNAMIC_STATE_STENCIL_WRITE_MASK => DynamicToggles::STENCIL_WRITE_MASK,
            vk::DYNAMIC_STATE_STENCIL_REFERENCE => DynamicToggles::STENCIL_REFERENCE,
            _ => DynamicToggles::empty(),
        }
    }
}

pub fn compute_shader_module_hash(info: &ShaderModuleInput<'_>) -> Hash {
    let mut h = Hasher::new();
    h.data(info.code);
    h.u32(info.flags);
    h.get()
}

pub fn compute_sampler_hash(info: &SamplerCreateInfo) -> Hash {
    let mut h = Hasher::new();
    h.u32(info.flags);
    h.u32(info.mag_filter);
    h.u32(info.min_filter);
    h.u32(info.mipmap_mode);
    h.u32(info.address_mode_u);
    h.u32(info.address_mode_v);
    h.u32(info.address_mode_w);
    h.f32(info.mip_lod_bias);
    h.u32(info.anisotropy_enable as u32);
    h.f32(info.max_anisotropy);
    h.u32(info.compare_enable as u32);
    h.u32(info.compare_op);
    h.f32(info.min_lod);
    h.f32(info.max_lod);
    h.u32(info.border_color);
    h.u32(info.unnormalized_coordinates as u32);
    h.get()
}

/// Immutable samplers contribute their recorded hashes, and only for the
/// two descriptor types whose layout actually consumes them.
pub fn compute_descriptor_set_layout_hash(
    recorder: &StateRecorder,
    info: &DescriptorSetLayoutInput,
) -> Result<Hash, RecordError> {
    let mut h = Hasher::new();
    h.u32(info.bindings.len() as u32);
    h.u32(info.flags);
    for binding in &info.bindings {
        h.u32(binding.binding);
        h.u32(binding.descriptor_count);
        h.u32(binding.descriptor_type);
        h.u32(binding.stage_flags);

        if let Some(samplers) = &binding.immutable_samplers {
            if binding.descriptor_type == vk::DESCRIPTOR_TYPE_COMBINED_IMAGE_SAMPLER
                || binding.descriptor_type == vk::DESCRIPTOR_TYPE_SAMPLER
            {
                for &sampler in samplers {
                    h.u64(recorder.get_sampler_hash(sampler)?);
                }
            }
        }
    }
    Ok(h.get())
}

pub fn compute_pipeline_layout_hash(
    recorder: &StateRecorder,
    info: &PipelineLayoutInput,
) -> Result<Hash, RecordError> {
    let mut h = Hasher::new();
    h.u32(info.set_layouts.len() as u32);
    for &layout in &info.set_layouts {
        if layout.is_null() {
            h.u32(0);
        } else {
            h.u64(recorder.get_descriptor_set_layout_hash(layout)?);
        }
    }

    h.u32(info.push_constant_ranges.len() as u32);
    for range in &info.push_constant_ranges {
        h.u32(range.stage_flags);
        h.u32(range.size);
        h.u32(range.offset);
    }

    h.u32(info.flags);
    Ok(h.get())
}

fn hash_attachment(h: &mut Hasher, att: &AttachmentDescription) {
    h.u32(att.flags);
    h.u32(att.initial_layout);
    h.u32(att.final_layout);
    h.u32(att.format);
    h.u32(att.load_op);
    h.u32(att.store_op);
    h.u32(att.stencil_load_op);
    h.u32(att.stencil_store_op);
    h.u32(att.samples);
}

fn hash_dependency(h: &mut Hasher, dep: &SubpassDependency) {
    h.u32(dep.dependency_flags);
    h.u32(dep.dst_access_mask);
    h.u32(dep.src_access_mask);
    h.u32(dep.src_subpass);
    h.u32(dep.dst_subpass);
    h.u32(dep.src_stage_mask);
    h.u32(dep.dst_stage_mask);
}

fn hash_subpass(h: &mut Hasher, subpass: &SubpassDescription) {
    h.u32(subpass.flags);
    h.u32(subpass.color_attachments.len() as u32);
    h.u32(subpass.input_attachments.len() as u32);
    h.u32(subpass.preserve_attachments.len() as u32);
    h.u32(subpass.pipeline_bind_point);

    for &preserve in &subpass.preserve_attachments {
        h.u32(preserve);
    }
    for color in &subpass.color_attachments {
        h.u32(color.attachment);
        h.u32(color.layout);
    }
    for input in &subpass.input_attachments {
        h.u32(input.attachment);
        h.u32(input.layout);
    }
    if let Some(resolves) = &subpass.resolve_attachments {
        for resolve in resolves {
            h.u32(resolve.attachment);
            h.u32(resolve.layout);
        }
    }
    match &subpass.depth_stencil_attachment {
        Some(ds) => {
            h.u32(ds.attachment);
            h.u32(ds.layout);
        }
        None => h.u32(0),
    }
}

pub fn compute_render_pass_hash(info: &RenderPassCreateInfo) -> Hash {
    let mut h = Hasher::new();
    h.u32(info.attachments.len() as u32);
    h.u32(info.dependencies.len() as u32);
    h.u32(info.subpasses.len() as u32);

    for att in &info.attachments {
        hash_attachment(&mut h, att);
    }
    for dep in &info.dependencies {
        hash_dependency(&mut h, dep);
    }
    for subpass in &info.subpasses {
        hash_subpass(&mut h, subpass);
    }
    h.get()
}

fn hash_specialization_info(h: &mut Hasher, spec: &SpecializationInfo<&[u8]>) {
    h.data(spec.data);
    h.u32(spec.data.len() as u32);
    h.u32(spec.map_entries.len() as u32);
    for entry in &spec.map_entries {
        h.u32(entry.offset);
        h.u32(entry.size);
        h.u32(entry.constant_id);
    }
}

fn hash_stage(
    h: &mut Hasher,
    recorder: &StateRecorder,
    stage: &ShaderStageInfo<Handle, &[u8]>,
) -> Result<(), RecordError> {
    h.u32(stage.flags);
    h.string(&stage.name);
    h.u32(stage.stage);
    h.u64(recorder.get_shader_module_hash(stage.module)?);
    match &stage.specialization_info {
        Some(spec) => hash_specialization_info(h, spec),
        None => h.u32(0),
    }
    Ok(())
}

fn uses_constant_blend_factor(factor: u32) -> bool {
    matches!(
        factor,
        vk::BLEND_FACTOR_CONSTANT_COLOR
            | vk::BLEND_FACTOR_ONE_MINUS_CONSTANT_COLOR
            | vk::BLEND_FACTOR_CONSTANT_ALPHA
            | vk::BLEND_FACTOR_ONE_MINUS_CONSTANT_ALPHA
    )
}

pub fn compute_graphics_pipeline_hash(
    recorder: &StateRecorder,
    info: &GraphicsPipelineInput<'_>,
) -> Result<Hash, RecordError> {
    let mut h = Hasher::new();

    h.u32(info.flags);

    if !info.base_pipeline.is_null() {
        h.u64(recorder.get_graphics_pipeline_hash(info.base_pipeline)?);
        h.s32(info.base_pipeline_index);
    }

    h.u64(recorder.get_pipeline_layout_hash(info.layout)?);
    h.u64(recorder.get_render_pass_hash(info.render_pass)?);
    h.u32(info.subpass);
    h.u32(info.stages.len() as u32);

    // First pass: extract the dynamic toggle set. It gates which static
    // values below enter the fingerprint at all.
    let mut dynamic = DynamicToggles::empty();
    match &info.dynamic_state {
        Some(dyn_state) => {
            h.u32(dyn_state.dynamic_states.len() as u32);
            h.u32(dyn_state.flags);
            for &state in &dyn_state.dynamic_states {
                h.u32(state);
                dynamic |= DynamicToggles::from_state(state);
            }
        }
        None => h.u32(0),
    }

    match &info.depth_stencil_state {
        Some(ds) => {
            h.u32(ds.flags);
            h.u32(ds.depth_bounds_test_enable as u32);
            h.u32(ds.depth_compare_op);
            h.u32(ds.depth_test_enable as u32);
            h.u32(ds.depth_write_enable as u32);
            h.u32(ds.front.compare_op);
            h.u32(ds.front.depth_fail_op);
            h.u32(ds.front.fail_op);
            h.u32(ds.front.pass_op);
            h.u32(ds.back.compare_op);
            h.u32(ds.back.depth_fail_op);
            h.u32(ds.back.fail_op);
            h.u32(ds.back.pass_op);
            h.u32(ds.stencil_test_enable as u32);

            if !dynamic.contains(DynamicToggles::DEPTH_BOUNDS) && ds.depth_bounds_test_enable {
                h.f32(ds.min_depth_bounds);
                h.f32(ds.max_depth_bounds);
            }

            if ds.stencil_test_enable {
                if !dynamic.contains(DynamicToggles::STENCIL_COMPARE_MASK) {
                    h.u32(ds.front.compare_mask);
                    h.u32(ds.back.compare_mask);
                }
                if !dynamic.contains(DynamicToggles::STENCIL_REFERENCE) {
                    h.u32(ds.front.reference);
                    h.u32(ds.back.reference);
                }
                if !dynamic.contains(DynamicToggles::STENCIL_WRITE_MASK) {
                    h.u32(ds.front.write_mask);
                    h.u32(ds.back.write_mask);
                }
            }
        }
        None => h.u32(0),
    }

    match &info.input_assembly_state {
        Some(ia) => {
            h.u32(ia.flags);
            h.u32(ia.primitive_restart_enable as u32);
            h.u32(ia.topology);
        }
        None => h.u32(0),
    }

    match &info.rasterization_state {
        Some(rs) => {
            h.u32(rs.flags);
            h.u32(rs.cull_mode);
            h.u32(rs.depth_clamp_enable as u32);
            h.u32(rs.front_face);
            h.u32(rs.rasterizer_discard_enable as u32);
            h.u32(rs.polygon_mode);
            h.u32(rs.depth_bias_enable as u32);

            if rs.depth_bias_enable && !dynamic.contains(DynamicToggles::DEPTH_BIAS) {
                h.f32(rs.depth_bias_clamp);
                h.f32(rs.depth_bias_slope_factor);
                h.f32(rs.depth_bias_constant_factor);
            }

            if !dynamic.contains(DynamicToggles::LINE_WIDTH) {
                h.f32(rs.line_width);
            }
        }
        None => h.u32(0),
    }

    match &info.multisample_state {
        Some(ms) => {
            h.u32(ms.flags);
            h.u32(ms.alpha_to_coverage_enable as u32);
            h.u32(ms.alpha_to_one_enable as u32);
            h.f32(ms.min_sample_shading);
            h.u32(ms.rasterization_samples);
            h.u32(ms.sample_shading_enable as u32);
            match &ms.sample_mask {
                Some(mask) => {
                    let words = (ms.rasterization_samples as usize + 31) / 32;
                    for &word in mask.iter().take(words) {
                        h.u32(word);
                    }
                }
                None => h.u32(0),
            }
        }
        None => h.u32(0),
    }

    match &info.viewport_state {
        Some(vp) => {
            h.u32(vp.flags);
            h.u32(vp.scissors.len() as u32);
            h.u32(vp.viewports.len() as u32);
            if !dynamic.contains(DynamicToggles::SCISSOR) {
                for scissor in &vp.scissors {
                    h.s32(scissor.x);
                    h.s32(scissor.y);
                    h.u32(scissor.width);
                    h.u32(scissor.height);
                }
            }
            if !dynamic.contains(DynamicToggles::VIEWPORT) {
                for viewport in &vp.viewports {
                    h.f32(viewport.x);
                    h.f32(viewport.y);
                    h.f32(viewport.width);
                    h.f32(viewport.height);
                    h.f32(viewport.min_depth);
                    h.f32(viewport.max_depth);
                }
            }
        }
        None => h.u32(0),
    }

    match &info.vertex_input_state {
        Some(vi) => {
            h.u32(vi.flags);
            h.u32(vi.attributes.len() as u32);
            h.u32(vi.bindings.len() as u32);
            for attr in &vi.attributes {
                h.u32(attr.offset);
                h.u32(attr.binding);
                h.u32(attr.format);
                h.u32(attr.location);
            }
            for binding in &vi.bindings {
                h.u32(binding.binding);
                h.u32(binding.input_rate);
                h.u32(binding.stride);
            }
        }
        None => h.u32(0),
    }

    match &info.color_blend_state {
        Some(cb) => {
            h.u32(cb.flags);
            h.u32(cb.attachments.len() as u32);
            h.u32(cb.logic_op_enable as u32);
            h.u32(cb.logic_op);

            let mut need_blend_constants = false;
            for att in &cb.attachments {
                h.u32(att.blend_enable as u32);
                if att.blend_enable {
                    h.u32(att.color_write_mask);
                    h.u32(att.alpha_blend_op);
                    h.u32(att.color_blend_op);
                    h.u32(att.dst_alpha_blend_factor);
                    h.u32(att.src_alpha_blend_factor);
                    h.u32(att.dst_color_blend_factor);
                    h.u32(att.src_color_blend_factor);

                    need_blend_constants |= uses_constant_blend_factor(att.src_color_blend_factor)
                        || uses_constant_blend_factor(att.dst_color_blend_factor)
                        || uses_constant_blend_factor(att.src_alpha_blend_factor)
                        || uses_constant_blend_factor(att.dst_alpha_blend_factor);
                } else {
                    h.u32(0);
                }
            }

            if need_blend_constants && !dynamic.contains(DynamicToggles::BLEND_CONSTANTS) {
                for &constant in &cb.blend_constants {
                    h.f32(constant);
                }
            }
        }
        None => h.u32(0),
    }

    match &info.tessellation_state {
        Some(tess) => {
            h.u32(tess.flags);
            h.u32(tess.patch_control_points);
        }
        None => h.u32(0),
    }

    for stage in &info.stages {
        hash_stage(&mut h, recorder, stage)?;
    }

    Ok(h.get())
}

pub fn compute_compute_pipeline_hash(
    recorder: &StateRecorder,
    info: &ComputePipelineInput<'_>,
) -> Result<Hash, RecordError> {
    let mut h = Hasher::new();

    h.u64(recorder.get_pipeline_layout_hash(info.layout)?);
    h.u32(info.flags);

    if !info.base_pipeline.is_null() {
        h.u64(recorder.get_compute_pipeline_hash(info.base_pipeline)?);
        h.s32(info.base_pipeline_index);
    } else {
        h.u32(0);
    }

    h.u64(recorder.get_shader_module_hash(info.stage.module)?);
    h.string(&info.stage.name);
    h.u32(info.stage.flags);
    h.u32(info.stage.stage);

    match &info.stage.specialization_info {
        Some(spec) => hash_specialization_info(&mut h, spec),
        None => h.u32(0),
    }

    Ok(h.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder_with_basics() -> (StateRecorder, Handle, Handle, Handle) {
        let mut recorder = StateRecorder::new();

        let module = Handle(0x100);
        let code = [0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0];
        let module_info = ShaderModuleCreateInfo {
            flags: 0,
            code: &code[..],
        };
        let hash = compute_shader_module_hash(&module_info);
        let index = recorder.register_shader_module(hash, &module_info).unwrap();
        recorder.set_shader_module_handle(index, module);

        let layout = Handle(0x200);
        let layout_info = PipelineLayoutCreateInfo {
            flags: 0,
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
        };
        let hash = compute_pipeline_layout_hash(&recorder, &layout_info).unwrap();
        let index = recorder.register_pipeline_layout(hash, &layout_info).unwrap();
        recorder.set_pipeline_layout_handle(index, layout);

        let render_pass = Handle(0x300);
        let pass_info = RenderPassCreateInfo {
            flags: 0,
            attachments: vec![AttachmentDescription {
                format: 44,
                samples: 1,
                ..Default::default()
            }],
            subpasses: vec![SubpassDescription {
                color_attachments: vec![AttachmentReference {
                    attachment: 0,
                    layout: 2,
                }],
                ..Default::default()
            }],
            dependencies: Vec::new(),
        };
        let hash = compute_render_pass_hash(&pass_info);
        let index = recorder.register_render_pass(hash, &pass_info);
        recorder.set_render_pass_handle(index, render_pass);

        (recorder, module, layout, render_pass)
    }

    fn base_pipeline(module: Handle, layout: Handle, render_pass: Handle) -> GraphicsPipelineInput<'static> {
        GraphicsPipelineCreateInfo {
            flags: 0,
            stages: vec![ShaderStageInfo {
                flags: 0,
                stage: 0x10,
                module,
                name: "main".to_string(),
                specialization_info: None,
            }],
            vertex_input_state: Some(VertexInputState::default()),
            input_assembly_state: Some(InputAssemblyState {
                flags: 0,
                topology: 3,
                primitive_restart_enable: false,
            }),
            tessellation_state: None,
            viewport_state: Some(ViewportState {
                flags: 0,
                viewports: vec![Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
                scissors: vec![Rect2D {
                    x: 0,
                    y: 0,
                    width: 10,
                    height: 10,
                }],
            }),
            rasterization_state: Some(RasterizationState::default()),
            multisample_state: Some(MultisampleState {
                rasterization_samples: 1,
                ..Default::default()
            }),
            depth_stencil_state: None,
            color_blend_state: None,
            dynamic_state: None,
            layout,
            render_pass,
            subpass: 0,
            base_pipeline: Handle::NULL,
            base_pipeline_index: -1,
        }
    }

    #[test]
    fn graphics_pipeline_hash_is_deterministic() {
        let (recorder, module, layout, pass) = recorder_with_basics();
        let info = base_pipeline(module, layout, pass);
        let a = compute_graphics_pipeline_hash(&recorder, &info).unwrap();
        let b = compute_graphics_pipeline_hash(&recorder, &info).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn viewport_width_changes_hash_when_static() {
        let (recorder, module, layout, pass) = recorder_with_basics();
        let a = base_pipeline(module, layout, pass);
        let mut b = base_pipeline(module, layout, pass);
        b.viewport_state.as_mut().unwrap().viewports[0].width = 20.0;

        assert_ne!(
            compute_graphics_pipeline_hash(&recorder, &a).unwrap(),
            compute_graphics_pipeline_hash(&recorder, &b).unwrap()
        );
    }

    #[test]
    fn dynamic_viewport_masks_viewport_values() {
        let (recorder, module, layout, pass) = recorder_with_basics();
        let mut a = base_pipeline(module, layout, pass);
        let mut b = base_pipeline(module, layout, pass);
        for info in [&mut a, &mut b] {
            info.dynamic_state = Some(DynamicStateInfo {
                flags: 0,
                dynamic_states: vec![vk::DYNAMIC_STATE_VIEWPORT],
            });
        }
        b.viewport_state.as_mut().unwrap().viewports[0].width = 20.0;

        assert_eq!(
            compute_graphics_pipeline_hash(&recorder, &a).unwrap(),
            compute_graphics_pipeline_hash(&recorder, &b).unwrap()
        );
    }

    fn with_constant_blend(info: &mut GraphicsPipelineInput<'_>, constant: f32) {
        info.color_blend_state = Some(ColorBlendState {
            flags: 0,
            logic_op_enable: false,
            logic_op: 0,
            attachments: vec![ColorBlendAttachmentState {
                blend_enable: true,
                src_color_blend_factor: vk::BLEND_FACTOR_CONSTANT_COLOR,
                dst_color_blend_factor: 0,
                color_blend_op: 0,
                src_alpha_blend_factor: 1,
                dst_alpha_blend_factor: 0,
                alpha_blend_op: 0,
                color_write_mask: 0xf,
            }],
            blend_constants: [constant, 0.0, 0.0, 0.0],
        });
    }

    #[test]
    fn blend_constants_hash_only_when_static() {
        let (recorder, module, layout, pass) = recorder_with_basics();

        // Static blend constants: differing values must fingerprint apart.
        let mut a = base_pipeline(module, layout, pass);
        let mut b = base_pipeline(module, layout, pass);
        with_constant_blend(&mut a, 0.5);
        with_constant_blend(&mut b, 0.25);
        assert_ne!(
            compute_graphics_pipeline_hash(&recorder, &a).unwrap(),
            compute_graphics_pipeline_hash(&recorder, &b).unwrap()
        );

        // Dynamic blend constants: the same difference must vanish.
        for info in [&mut a, &mut b] {
            info.dynamic_state = Some(DynamicStateInfo {
                flags: 0,
                dynamic_states: vec![vk::DYNAMIC_STATE_BLEND_CONSTANTS],
            });
        }
        assert_eq!(
            compute_graphics_pipeline_hash(&recorder, &a).unwrap(),
            compute_graphics_pipeline_hash(&recorder, &b).unwrap()
        );
    }

    #[test]
    fn blend_constants_ignored_without_constant_factor() {
        let (recorder, module, layout, pass) = recorder_with_basics();
        let mut a = base_pipeline(module, layout, pass);
        let mut b = base_pipeline(module, layout, pass);
        with_constant_blend(&mut a, 0.5);
        with_constant_blend(&mut b, 0.25);
        for info in [&mut a, &mut b] {
            let cb = info.color_blend_state.as_mut().unwrap();
            cb.attachments[0].src_color_blend_factor = 1;
        }
        assert_eq!(
            compute_graphics_pipeline_hash(&recorder, &a).unwrap(),
            compute_graphics_pipeline_hash(&recorder, &b).unwrap()
        );
    }

    #[test]
    fn entry_point_name_affects_stage_hash() {
        let (recorder, module, layout, pass) = recorder_with_basics();
        let a = base_pipeline(module, layout, pass);
        let mut b = base_pipeline(module, layout, pass);
        b.stages[0].name = "main2".to_string();
        assert_ne!(
            compute_graphics_pipeline_hash(&recorder, &a).unwrap(),
            compute_graphics_pipeline_hash(&recorder, &b).unwrap()
        );
    }

    #[test]
    fn unknown_module_handle_is_rejected() {
        let (recorder, _, layout, pass) = recorder_with_basics();
        let info = base_pipeline(Handle(0xbad), layout, pass);
        assert!(matches!(
            compute_graphics_pipeline_hash(&recorder, &info),
            Err(RecordError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn immutable_samplers_feed_their_recorded_hash() {
        let mut recorder = StateRecorder::new();
        let sampler_a = SamplerCreateInfo {
            mag_filter: 1,
            ..Default::default()
        };
        let sampler_b = SamplerCreateInfo {
            mag_filter: 0,
            ..Default::default()
        };
        let index = recorder.register_sampler(compute_sampler_hash(&sampler_a), &sampler_a);
        recorder.set_sampler_handle(index, Handle(1));
        let index = recorder.register_sampler(compute_sampler_hash(&sampler_b), &sampler_b);
        recorder.set_sampler_handle(index, Handle(2));

        let layout = |sampler: Handle| DescriptorSetLayoutCreateInfo {
            flags: 0,
            bindings: vec![DescriptorSetLayoutBinding {
                binding: 0,
                descriptor_type: vk::DESCRIPTOR_TYPE_COMBINED_IMAGE_SAMPLER,
                descriptor_count: 1,
                stage_flags: 0x10,
                immutable_samplers: Some(vec![sampler]),
            }],
        };

        assert_ne!(
            compute_descriptor_set_layout_hash(&recorder, &layout(Handle(1))).unwrap(),
            compute_descriptor_set_layout_hash(&recorder, &layout(Handle(2))).unwrap()
        );
    }
}
