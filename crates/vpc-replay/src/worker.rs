//! The slave side of crash-isolated replay.
//!
//! A worker replays its assigned contiguous pipeline ranges from the state
//! documents, reporting the index it is about to replay on stdout so the
//! supervisor can resume exactly there after a crash. Shader modules the
//! supervisor has blacklisted arrive on stdin before work starts and are
//! never created; pipelines that depend on them are skipped.
//!
//! Crashes are reported cooperatively: a hook writes `CRASH`, the module
//! hashes of the pipeline in flight and the final progress markers to
//! stdout, then exits with code 2 so the supervisor can tell a reported
//! crash from a dirty death.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use vpc_core::types::*;
use vpc_core::{ReplayError, StateCreator, StateReplayer};

use crate::message::WorkerMessage;

#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    pub databases: Vec<PathBuf>,
    pub graphics_range: (u32, u32),
    pub compute_range: (u32, u32),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to read database: {0}")]
    Io(#[from] std::io::Error),

    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
}

/// State the crash hook needs to report before the process dies.
#[derive(Default)]
pub struct CrashReport {
    current_graphics: AtomicU32,
    current_compute: AtomicU32,
    /// Modules of the pipeline in flight; emptied again on success.
    suspect_modules: Mutex<Vec<Hash>>,
}

/// Read blacklisted module hashes from stdin until EOF or a `0` entry.
pub fn read_masked_modules(input: &mut dyn BufRead) -> HashSet<Hash> {
    let mut masked = HashSet::new();
    for line in input.lines() {
        let Ok(line) = line else { break };
        let Ok(hash) = Hash::from_str_radix(line.trim(), 16) else {
            break;
        };
        if hash == 0 {
            break;
        }
        debug!(module = format_args!("{hash:x}"), "masking shader module");
        masked.insert(hash);
    }
    masked
}

/// Install a panic hook that reports the crash over stdout and exits with
/// code 2. The supervisor arms its grace timer on the `CRASH` line.
pub fn install_crash_hook(report: Arc<CrashReport>) {
    std::panic::set_hook(Box::new(move |_| {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "{}", WorkerMessage::Crash);
        if let Ok(suspects) = report.suspect_modules.lock() {
            for &hash in suspects.iter() {
                let _ = writeln!(out, "{}", WorkerMessage::Module(hash));
            }
        }
        let _ = writeln!(
            out,
            "{}",
            WorkerMessage::Graphics(report.current_graphics.load(Ordering::Relaxed))
        );
        let _ = writeln!(
            out,
            "{}",
            WorkerMessage::Compute(report.current_compute.load(Ordering::Relaxed))
        );
        let _ = out.flush();
        std::process::exit(2);
    }));
}

/// Wraps the real creator with range filtering, module masking and
/// progress reporting. Pipeline indices count across all parsed
/// documents, matching how the supervisor sized the ranges.
pub struct RangeCreator<C, W> {
    inner: C,
    progress: W,
    graphics_range: (u32, u32),
    compute_range: (u32, u32),
    next_graphics: u32,
    next_compute: u32,
    masked_modules: HashSet<Hash>,
    module_hashes: HashMap<Handle, Hash>,
    report: Arc<CrashReport>,
}

impl<C: StateCreator, W: Write> RangeCreator<C, W> {
    pub fn new(
        inner: C,
        progress: W,
        options: &WorkerOptions,
        masked_modules: HashSet<Hash>,
        report: Arc<CrashReport>,
    ) -> Self {
        Self {
            inner,
            progress,
            graphics_range: options.graphics_range,
            compute_range: options.compute_range,
            next_graphics: 0,
            next_compute: 0,
            masked_modules,
            module_hashes: HashMap::new(),
            report,
        }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn stage_modules<B>(&self, stages: &[ShaderStageInfo<Handle, B>]) -> Vec<Hash> {
        stages
            .iter()
            .filter_map(|s| self.module_hashes.get(&s.module).copied())
            .collect()
    }

    /// A pipeline is replayable only when every referenced module was
    /// actually created.
    fn stages_usable<B>(&self, stages: &[ShaderStageInfo<Handle, B>]) -> bool {
        stages.iter().all(|s| !s.module.is_null())
    }

    fn begin_pipeline(&mut self, modules: Vec<Hash>) {
        if let Ok(mut suspects) = self.report.suspect_modules.lock() {
            *suspects = modules;
        }
    }

    fn end_pipeline(&mut self) {
        if let Ok(mut suspects) = self.report.suspect_modules.lock() {
            suspects.clear();
        }
    }
}

impl<C: StateCreator, W: Write> StateCreator for RangeCreator<C, W> {
    fn set_num_shader_modules(&mut self, count: usize) {
        self.inner.set_num_shader_modules(count);
    }
    fn set_num_samplers(&mut self, count: usize) {
        self.inner.set_num_samplers(count);
    }
    fn set_num_descriptor_set_layouts(&mut self, count: usize) {
        self.inner.set_num_descriptor_set_layouts(count);
    }
    fn set_num_pipeline_layouts(&mut self, count: usize) {
        self.inner.set_num_pipeline_layouts(count);
    }
    fn set_num_render_passes(&mut self, count: usize) {
        self.inner.set_num_render_passes(count);
    }
    fn set_num_compute_pipelines(&mut self, count: usize) {
        self.inner.set_num_compute_pipelines(count);
    }
    fn set_num_graphics_pipelines(&mut self, count: usize) {
        self.inner.set_num_graphics_pipelines(count);
    }

    fn enqueue_create_shader_module(
        &mut self,
        hash: Hash,
        index: usize,
        info: &ShaderModuleInput<'_>,
    ) -> Result<Handle, ReplayError> {
        if self.masked_modules.contains(&hash) {
            info!(module = format_args!("{hash:x}"), "skipping blacklisted shader module");
            return Ok(Handle::NULL);
        }
        let handle = self.inner.enqueue_create_shader_module(hash, index, info)?;
        self.module_hashes.insert(handle, hash);
        Ok(handle)
    }

    fn enqueue_create_sampler(
        &mut self,
        hash: Hash,
        index: usize,
        info: &SamplerCreateInfo,
    ) -> Result<Handle, ReplayError> {
        self.inner.enqueue_create_sampler(hash, index, info)
    }

    fn enqueue_create_descriptor_set_layout(
        &mut self,
        hash: Hash,
        index: usize,
        info: &DescriptorSetLayoutInput,
    ) -> Result<Handle, ReplayError> {
        self.inner
            .enqueue_create_descriptor_set_layout(hash, index, info)
    }

    fn enqueue_create_pipeline_layout(
        &mut self,
        hash: Hash,
        index: usize,
        info: &PipelineLayoutInput,
    ) -> Result<Handle, ReplayError> {
        self.inner.enqueue_create_pipeline_layout(hash, index, info)
    }

    fn enqueue_create_render_pass(
        &mut self,
        hash: Hash,
        index: usize,
        info: &RenderPassCreateInfo,
    ) -> Result<Handle, ReplayError> {
        self.inner.enqueue_create_render_pass(hash, index, info)
    }

    fn enqueue_create_compute_pipeline(
        &mut self,
        hash: Hash,
        index: usize,
        info: &ComputePipelineInput<'_>,
    ) -> Result<Handle, ReplayError> {
        let global_index = self.next_compute;
        self.next_compute += 1;

        let (start, end) = self.compute_range;
        if global_index < start || global_index >= end {
            return Ok(Handle::NULL);
        }

        self.report
            .current_compute
            .store(global_index, Ordering::Relaxed);
        writeln!(self.progress, "{}", WorkerMessage::Compute(global_index))
            .map_err(|e| ReplayError::Creation(e.to_string()))?;
        self.progress
            .flush()
            .map_err(|e| ReplayError::Creation(e.to_string()))?;

        let stages = std::slice::from_ref(&info.stage);
        if !self.stages_usable(stages) {
            warn!(index = global_index, "skipping compute pipeline with masked module");
            return Ok(Handle::NULL);
        }

        self.begin_pipeline(self.stage_modules(stages));
        let handle = self.inner.enqueue_create_compute_pipeline(hash, index, info)?;
        self.end_pipeline();
        Ok(handle)
    }

    fn enqueue_create_graphics_pipeline(
        &mut self,
        hash: Hash,
        index: usize,
        info: &GraphicsPipelineInput<'_>,
    ) -> Result<Handle, ReplayError> {
        let global_index = self.next_graphics;
        self.next_graphics += 1;

        let (start, end) = self.graphics_range;
        if global_index < start || global_index >= end {
            return Ok(Handle::NULL);
        }

        self.report
            .current_graphics
            .store(global_index, Ordering::Relaxed);
        writeln!(self.progress, "{}", WorkerMessage::Graphics(global_index))
            .map_err(|e| ReplayError::Creation(e.to_string()))?;
        self.progress
            .flush()
            .map_err(|e| ReplayError::Creation(e.to_string()))?;

        if !self.stages_usable(&info.stages) {
            warn!(index = global_index, "skipping graphics pipeline with masked module");
            return Ok(Handle::NULL);
        }

        self.begin_pipeline(self.stage_modules(&info.stages));
        let handle = self.inner.enqueue_create_graphics_pipeline(hash, index, info)?;
        self.end_pipeline();
        Ok(handle)
    }

    fn wait_enqueue(&mut self) -> Result<(), ReplayError> {
        self.inner.wait_enqueue()
    }
}

/// Slave-process entry point: read the blacklist, arm the crash hook and
/// replay every database document through the wrapped creator. Returns
/// the process exit code.
pub fn run_worker<C: StateCreator>(creator: C, options: &WorkerOptions) -> Result<i32, WorkerError> {
    let masked = read_masked_modules(&mut std::io::stdin().lock());
    let report = Arc::new(CrashReport::default());
    install_crash_hook(report.clone());

    let mut range_creator =
        RangeCreator::new(creator, std::io::stdout(), options, masked, report);

    for path in &options.databases {
        let bytes = std::fs::read(path)?;
        let mut replayer = StateReplayer::new();
        replayer.parse(&mut range_creator, &bytes)?;
        info!(database = %path.display(), "database replayed");
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpc_core::hashing::{
        compute_graphics_pipeline_hash, compute_pipeline_layout_hash, compute_render_pass_hash,
        compute_shader_module_hash,
    };
    use vpc_core::StateRecorder;

    /// Hands out sequential handles and counts pipeline creations.
    #[derive(Default)]
    struct CountingCreator {
        next: u64,
        graphics: Vec<usize>,
    }

    impl StateCreator for CountingCreator {
        fn enqueue_create_shader_module(
            &mut self,
            _hash: Hash,
            _index: usize,
            _info: &ShaderModuleInput<'_>,
        ) -> Result<Handle, ReplayError> {
            self.next += 1;
            Ok(Handle(self.next))
        }
        fn enqueue_create_sampler(
            &mut self,
            _hash: Hash,
            _index: usize,
            _info: &SamplerCreateInfo,
        ) -> Result<Handle, ReplayError> {
            self.next += 1;
            Ok(Handle(self.next))
        }
        fn enqueue_create_descriptor_set_layout(
            &mut self,
            _hash: Hash,
            _index: usize,
            _info: &DescriptorSetLayoutInput,
        ) -> Result<Handle, ReplayError> {
            self.next += 1;
            Ok(Handle(self.next))
        }
        fn enqueue_create_pipeline_layout(
            &mut self,
            _hash: Hash,
            _index: usize,
            _info: &PipelineLayoutInput,
        ) -> Result<Handle, ReplayError> {
            self.next += 1;
            Ok(Handle(self.next))
        }
        fn enqueue_create_render_pass(
            &mut self,
            _hash: Hash,
            _index: usize,
            _info: &RenderPassCreateInfo,
        ) -> Result<Handle, ReplayError> {
            self.next += 1;
            Ok(Handle(self.next))
        }
        fn enqueue_create_compute_pipeline(
            &mut self,
            _hash: Hash,
            _index: usize,
            _info: &ComputePipelineInput<'_>,
        ) -> Result<Handle, ReplayError> {
            self.next += 1;
            Ok(Handle(self.next))
        }
        fn enqueue_create_graphics_pipeline(
            &mut self,
            _hash: Hash,
            index: usize,
            _info: &GraphicsPipelineInput<'_>,
        ) -> Result<Handle, ReplayError> {
            self.next += 1;
            self.graphics.push(index);
            Ok(Handle(self.next))
        }
    }

    fn document_with_graphics_pipelines(count: usize) -> (String, Hash) {
        let mut recorder = StateRecorder::new();

        let code = [0x03u8, 0x02, 0x23, 0x07];
        let module = ShaderModuleCreateInfo {
            flags: 0,
            code: &code[..],
        };
        let module_hash = compute_shader_module_hash(&module);
        let index = recorder.register_shader_module(module_hash, &module).unwrap();
        recorder.set_shader_module_handle(index, Handle(1));

        let layout = PipelineLayoutCreateInfo {
            flags: 0,
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
        };
        let layout_hash = compute_pipeline_layout_hash(&recorder, &layout).unwrap();
        let index = recorder.register_pipeline_layout(layout_hash, &layout).unwrap();
        recorder.set_pipeline_layout_handle(index, Handle(2));

        let pass = RenderPassCreateInfo::default();
        let pass_hash = compute_render_pass_hash(&pass);
        let index = recorder.register_render_pass(pass_hash, &pass);
        recorder.set_render_pass_handle(index, Handle(3));

        for subpass in 0..count as u32 {
            let pipeline = GraphicsPipelineCreateInfo {
                flags: 0,
                stages: vec![ShaderStageInfo {
                    flags: 0,
                    stage: 0x10,
                    module: Handle(1),
                    name: "main".to_string(),
                    specialization_info: None,
                }],
                vertex_input_state: None,
                input_assembly_state: None,
                tessellation_state: None,
                viewport_state: None,
                rasterization_state: None,
                multisample_state: None,
                depth_stencil_state: None,
                color_blend_state: None,
                dynamic_state: None,
                layout: Handle(2),
                render_pass: Handle(3),
                subpass,
                base_pipeline: Handle::NULL,
                base_pipeline_index: -1,
            };
            let hash = compute_graphics_pipeline_hash(&recorder, &pipeline).unwrap();
            let index = recorder.register_graphics_pipeline(hash, &pipeline).unwrap();
            recorder.set_graphics_pipeline_handle(index, Handle(10 + u64::from(subpass)));
        }

        (recorder.serialize().unwrap(), module_hash)
    }

    #[test]
    fn replays_only_the_assigned_range_and_reports_progress() {
        let (document, _) = document_with_graphics_pipelines(4);
        let options = WorkerOptions {
            databases: Vec::new(),
            graphics_range: (1, 3),
            compute_range: (0, 0),
        };

        let mut creator = RangeCreator::new(
            CountingCreator::default(),
            Vec::new(),
            &options,
            HashSet::new(),
            Arc::new(CrashReport::default()),
        );
        let mut replayer = StateReplayer::new();
        replayer.parse(&mut creator, document.as_bytes()).unwrap();

        let progress = String::from_utf8(creator.progress.clone()).unwrap();
        assert_eq!(progress, "GRAPHICS 1\nGRAPHICS 2\n");
        assert_eq!(creator.into_inner().graphics, vec![1, 2]);
    }

    #[test]
    fn masked_modules_skip_dependent_pipelines() {
        let (document, module_hash) = document_with_graphics_pipelines(2);
        let options = WorkerOptions {
            databases: Vec::new(),
            graphics_range: (0, 2),
            compute_range: (0, 0),
        };

        let mut masked = HashSet::new();
        masked.insert(module_hash);

        let mut creator = RangeCreator::new(
            CountingCreator::default(),
            Vec::new(),
            &options,
            masked,
            Arc::new(CrashReport::default()),
        );
        let mut replayer = StateReplayer::new();
        replayer.parse(&mut creator, document.as_bytes()).unwrap();

        // Progress is still reported for skipped pipelines, but nothing
        // is created.
        let progress = String::from_utf8(creator.progress.clone()).unwrap();
        assert_eq!(progress, "GRAPHICS 0\nGRAPHICS 1\n");
        assert!(creator.into_inner().graphics.is_empty());
    }

    #[test]
    fn masked_module_list_parses_until_terminator() {
        let mut input = std::io::Cursor::new(b"deadbeef\ncafe\n0\nffff\n".to_vec());
        let masked = read_masked_modules(&mut input);
        assert_eq!(masked.len(), 2);
        assert!(masked.contains(&0xdead_beef));
        assert!(masked.contains(&0xcafe));
    }
}
