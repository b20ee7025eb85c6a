//! Serde model of the serialized state document.
//!
//! UTF-8 JSON with one top-level array per descriptor kind, emitted in
//! dependency order. Every entry carries its recorded `hash`. Cross
//! references are unsigned integers encoding `index + 1` (0 = null); byte
//! blobs are `{codeSize, code}` / `{dataSize, code}` pairs with the payload
//! base64-encoded. Emission walks recorder lists in index order, so the
//! same recorder state always produces a byte-identical document.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::types::{
    ColorBlendState, DepthStencilState, DescriptorSetLayoutDesc, DynamicStateInfo, Hash,
    InputAssemblyState, MultisampleState, PipelineLayoutDesc, RasterizationState,
    RenderPassCreateInfo, ResourceRef, SamplerCreateInfo, SpecializationMapEntry,
    TessellationState, VertexInputState, ViewportState,
};

pub fn encode_blob(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_blob(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderModuleEntry {
    pub hash: Hash,
    pub flags: u32,
    /// Payload length in bytes, kept explicit beside the encoding.
    pub code_size: u64,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerEntry {
    pub hash: Hash,
    #[serde(flatten)]
    pub info: SamplerCreateInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorSetLayoutEntry {
    pub hash: Hash,
    #[serde(flatten)]
    pub info: DescriptorSetLayoutDesc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineLayoutEntry {
    pub hash: Hash,
    #[serde(flatten)]
    pub info: PipelineLayoutDesc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPassEntry {
    pub hash: Hash,
    #[serde(flatten)]
    pub info: RenderPassCreateInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecializationInfoEntry {
    pub data_size: u64,
    pub code: String,
    #[serde(default)]
    pub map_entries: Vec<SpecializationMapEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEntry {
    pub flags: u32,
    pub name: String,
    pub module: ResourceRef,
    pub stage: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization_info: Option<SpecializationInfoEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePipelineEntry {
    pub hash: Hash,
    pub flags: u32,
    pub layout: ResourceRef,
    pub base_pipeline_handle: ResourceRef,
    pub base_pipeline_index: i32,
    pub stage: StageEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphicsPipelineEntry {
    pub hash: Hash,
    pub flags: u32,
    pub base_pipeline_handle: ResourceRef,
    pub base_pipeline_index: i32,
    pub layout: ResourceRef,
    pub render_pass: ResourceRef,
    pub subpass: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex_input_state: Option<VertexInputState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_assembly_state: Option<InputAssemblyState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tessellation_state: Option<TessellationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_state: Option<ViewportState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rasterization_state: Option<RasterizationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multisample_state: Option<MultisampleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_stencil_state: Option<DepthStencilState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_blend_state: Option<ColorBlendState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_state: Option<DynamicStateInfo>,
    pub stages: Vec<StageEntry>,
}

/// Top-level document. Section order is the replay dependency order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default)]
    pub shader_modules: Vec<ShaderModuleEntry>,
    #[serde(default)]
    pub samplers: Vec<SamplerEntry>,
    #[serde(default)]
    pub descriptor_set_layouts: Vec<DescriptorSetLayoutEntry>,
    #[serde(default)]
    pub pipeline_layouts: Vec<PipelineLayoutEntry>,
    #[serde(default)]
    pub render_passes: Vec<RenderPassEntry>,
    #[serde(default)]
    pub compute_pipelines: Vec<ComputePipelineEntry>,
    #[serde(default)]
    pub graphics_pipelines: Vec<GraphicsPipelineEntry>,
}

impl StateDocument {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
