//! Value-copied descriptor model.
//!
//! Descriptors are plain owned structs. Fields that reference another
//! descriptor are generic over the reference representation `R`: at the
//! capture and replay boundary `R = Handle` (the opaque id the driver
//! handed out), in recorder storage and in the serialized document
//! `R = ResourceRef` (a dense index encoded as `index + 1`, with 0 meaning
//! null). Byte payloads are generic over `B` the same way: borrowed slices
//! at the boundary, arena [`ByteRange`](crate::arena::ByteRange) handles in
//! storage. Enum and flag fields ride through as raw integers; the engine
//! never interprets them except for the handful of constants in [`vk`].

use serde::{Deserialize, Serialize};

use crate::arena::ByteRange;

/// 64-bit content fingerprint. Equality is bitwise; no ordering semantics.
pub type Hash = u64;

/// The Vulkan enum values the engine itself interprets.
pub mod vk {
    pub const DESCRIPTOR_TYPE_SAMPLER: u32 = 0;
    pub const DESCRIPTOR_TYPE_COMBINED_IMAGE_SAMPLER: u32 = 1;

    pub const DYNAMIC_STATE_VIEWPORT: u32 = 0;
    pub const DYNAMIC_STATE_SCISSOR: u32 = 1;
    pub const DYNAMIC_STATE_LINE_WIDTH: u32 = 2;
    pub const DYNAMIC_STATE_DEPTH_BIAS: u32 = 3;
    pub const DYNAMIC_STATE_BLEND_CONSTANTS: u32 = 4;
    pub const DYNAMIC_STATE_DEPTH_BOUNDS: u32 = 5;
    pub const DYNAMIC_STATE_STENCIL_COMPARE_MASK: u32 = 6;
    pub const DYNAMIC_STATE_STENCIL_WRITE_MASK: u32 = 7;
    pub const DYNAMIC_STATE_STENCIL_REFERENCE: u32 = 8;

    pub const BLEND_FACTOR_CONSTANT_COLOR: u32 = 10;
    pub const BLEND_FACTOR_ONE_MINUS_CONSTANT_COLOR: u32 = 11;
    pub const BLEND_FACTOR_CONSTANT_ALPHA: u32 = 12;
    pub const BLEND_FACTOR_ONE_MINUS_CONSTANT_ALPHA: u32 = 13;
}

/// Opaque, process-local identifier produced by the driver. Has no
/// inter-process meaning; never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Stored cross-reference: a dense index encoded as `index + 1`, so that
/// 0 round-trips to null. This is what the document carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(pub u32);

impl ResourceRef {
    pub const NULL: ResourceRef = ResourceRef(0);

    pub fn from_index(index: usize) -> Self {
        ResourceRef(index as u32 + 1)
    }

    /// The dense index, or `None` for the null reference.
    pub fn index(&self) -> Option<usize> {
        (self.0 != 0).then(|| self.0 as usize - 1)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

// ── Shader modules ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ShaderModuleCreateInfo<B> {
    pub flags: u32,
    /// SPIR-V payload, byte-exact.
    pub code: B,
}

pub type ShaderModuleInput<'a> = ShaderModuleCreateInfo<&'a [u8]>;
pub type ShaderModuleDesc = ShaderModuleCreateInfo<ByteRange>;

// ── Samplers ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerCreateInfo {
    pub flags: u32,
    pub mag_filter: u32,
    pub min_filter: u32,
    pub mipmap_mode: u32,
    pub address_mode_u: u32,
    pub address_mode_v: u32,
    pub address_mode_w: u32,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: u32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: u32,
    pub unnormalized_coordinates: bool,
}

// ── Descriptor-set layouts ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSetLayoutBinding<R> {
    pub binding: u32,
    pub descriptor_type: u32,
    pub descriptor_count: u32,
    pub stage_flags: u32,
    /// One reference per descriptor in the binding. Only meaningful (and
    /// only retained) for SAMPLER and COMBINED_IMAGE_SAMPLER bindings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable_samplers: Option<Vec<R>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSetLayoutCreateInfo<R> {
    pub flags: u32,
    #[serde(default)]
    pub bindings: Vec<DescriptorSetLayoutBinding<R>>,
}

pub type DescriptorSetLayoutInput = DescriptorSetLayoutCreateInfo<Handle>;
pub type DescriptorSetLayoutDesc = DescriptorSetLayoutCreateInfo<ResourceRef>;

// ── Pipeline layouts ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConstantRange {
    pub stage_flags: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineLayoutCreateInfo<R> {
    pub flags: u32,
    /// May contain null references.
    #[serde(default)]
    pub set_layouts: Vec<R>,
    #[serde(default)]
    pub push_constant_ranges: Vec<PushConstantRange>,
}

pub type PipelineLayoutInput = PipelineLayoutCreateInfo<Handle>;
pub type PipelineLayoutDesc = PipelineLayoutCreateInfo<ResourceRef>;

// ── Render passes ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescription {
    pub flags: u32,
    pub format: u32,
    pub samples: u32,
    pub load_op: u32,
    pub store_op: u32,
    pub stencil_load_op: u32,
    pub stencil_store_op: u32,
    pub initial_layout: u32,
    pub final_layout: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: u32,
    pub dst_stage_mask: u32,
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub dependency_flags: u32,
}

/// Index into the owning render pass's attachment list, not a
/// cross-descriptor reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentReference {
    pub attachment: u32,
    pub layout: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubpassDescription {
    pub flags: u32,
    pub pipeline_bind_point: u32,
    #[serde(default)]
    pub input_attachments: Vec<AttachmentReference>,
    #[serde(default)]
    pub color_attachments: Vec<AttachmentReference>,
    /// When present, one resolve reference per color attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_attachments: Option<Vec<AttachmentReference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_stencil_attachment: Option<AttachmentReference>,
    #[serde(default)]
    pub preserve_attachments: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPassCreateInfo {
    pub flags: u32,
    #[serde(default)]
    pub attachments: Vec<AttachmentDescription>,
    #[serde(default)]
    pub subpasses: Vec<SubpassDescription>,
    #[serde(default)]
    pub dependencies: Vec<SubpassDependency>,
}

// ── Pipeline sub-states ──────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexInputBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexInputAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexInputState {
    pub flags: u32,
    #[serde(default)]
    pub bindings: Vec<VertexInputBinding>,
    #[serde(default)]
    pub attributes: Vec<VertexInputAttribute>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAssemblyState {
    pub flags: u32,
    pub topology: u32,
    pub primitive_restart_enable: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TessellationState {
    pub flags: u32,
    pub patch_control_points: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportState {
    pub flags: u32,
    #[serde(default)]
    pub viewports: Vec<Viewport>,
    #[serde(default)]
    pub scissors: Vec<Rect2D>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterizationState {
    pub flags: u32,
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub polygon_mode: u32,
    pub cull_mode: u32,
    pub front_face: u32,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            flags: 0,
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            polygon_mode: 0,
            cull_mode: 0,
            front_face: 0,
            depth_bias_enable: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisampleState {
    pub flags: u32,
    pub rasterization_samples: u32,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    /// One word per 32 samples when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_mask: Option<Vec<u32>>,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StencilOpState {
    pub fail_op: u32,
    pub pass_op: u32,
    pub depth_fail_op: u32,
    pub compare_op: u32,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthStencilState {
    pub flags: u32,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: u32,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorBlendAttachmentState {
    pub blend_enable: bool,
    pub src_color_blend_factor: u32,
    pub dst_color_blend_factor: u32,
    pub color_blend_op: u32,
    pub src_alpha_blend_factor: u32,
    pub dst_alpha_blend_factor: u32,
    pub alpha_blend_op: u32,
    pub color_write_mask: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorBlendState {
    pub flags: u32,
    pub logic_op_enable: bool,
    pub logic_op: u32,
    #[serde(default)]
    pub attachments: Vec<ColorBlendAttachmentState>,
    pub blend_constants: [f32; 4],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicStateInfo {
    pub flags: u32,
    #[serde(default)]
    pub dynamic_states: Vec<u32>,
}

// ── Shader stages and specialization ─────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecializationMapEntry {
    pub constant_id: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct SpecializationInfo<B> {
    pub data: B,
    pub map_entries: Vec<SpecializationMapEntry>,
}

#[derive(Debug, Clone)]
pub struct ShaderStageInfo<R, B> {
    pub flags: u32,
    pub stage: u32,
    pub module: R,
    /// Entry-point name.
    pub name: String,
    pub specialization_info: Option<SpecializationInfo<B>>,
}

// ── Pipelines ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GraphicsPipelineCreateInfo<R, B> {
    pub flags: u32,
    pub stages: Vec<ShaderStageInfo<R, B>>,
    pub vertex_input_state: Option<VertexInputState>,
    pub input_assembly_state: Option<InputAssemblyState>,
    pub tessellation_state: Option<TessellationState>,
    pub viewport_state: Option<ViewportState>,
    pub rasterization_state: Option<RasterizationState>,
    pub multisample_state: Option<MultisampleState>,
    pub depth_stencil_state: Option<DepthStencilState>,
    pub color_blend_state: Option<ColorBlendState>,
    pub dynamic_state: Option<DynamicStateInfo>,
    pub layout: R,
    pub render_pass: R,
    pub subpass: u32,
    pub base_pipeline: R,
    pub base_pipeline_index: i32,
}

pub type GraphicsPipelineInput<'a> = GraphicsPipelineCreateInfo<Handle, &'a [u8]>;
pub type GraphicsPipelineDesc = GraphicsPipelineCreateInfo<ResourceRef, ByteRange>;

#[derive(Debug, Clone)]
pub struct ComputePipelineCreateInfo<R, B> {
    pub flags: u32,
    pub stage: ShaderStageInfo<R, B>,
    pub layout: R,
    pub base_pipeline: R,
    pub base_pipeline_index: i32,
}

pub type ComputePipelineInput<'a> = ComputePipelineCreateInfo<Handle, &'a [u8]>;
pub type ComputePipelineDesc = ComputePipelineCreateInfo<ResourceRef, ByteRange>;

